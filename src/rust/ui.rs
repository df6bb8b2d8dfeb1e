//! Server-rendered HTML for the single demo page.

use std::fmt::Write;

use crate::session::{FeedbackState, InteractionState, SessionState};

const STYLE: &str = "body{font-family:sans-serif;max-width:720px;margin:2rem auto;padding:0 1rem}\
textarea{width:100%;min-height:6rem}\
.success{background:#e6f4ea;padding:.75rem;border-radius:4px;margin:.5rem 0}\
.info{background:#e8f0fe;padding:.75rem;border-radius:4px;margin:.5rem 0}\
.error{background:#fce8e6;padding:.75rem;border-radius:4px;margin:.5rem 0}\
.columns{display:flex;gap:1rem}";

/// Escapes text for use in HTML element content and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the page for the current state of one session.
pub fn render_page(state: &SessionState) -> String {
    let mut body = String::new();

    body.push_str("<h1>Sentiment Analysis &amp; Model Monitoring</h1>\n");
    body.push_str("<h2>💬 Try It Out!</h2>\n");
    let _ = write!(
        body,
        "<form method=\"post\" action=\"/analyze\">\
<label for=\"text\">Enter a sentence:</label>\
<textarea id=\"text\" name=\"text\">{}</textarea>\
<button type=\"submit\">Analyze Sentiment</button></form>\n",
        escape_html(&state.input_text)
    );

    if let Some(error) = &state.last_error {
        let _ = write!(
            body,
            "<div class=\"error\">Could not analyze this text: {}</div>\n",
            escape_html(error)
        );
    }

    if let Some(prediction) = &state.prediction {
        let _ = write!(
            body,
            "<div class=\"success\">Predicted Sentiment: {} {}</div>\n\
<div class=\"info\">Confidence: {:.2}</div>\n",
            prediction.label,
            prediction.label.emoji(),
            prediction.confidence
        );
    }

    if state.phase() == InteractionState::AwaitingFeedback {
        body.push_str(
            "<h3>Was this prediction correct?</h3>\n<div class=\"columns\">\
<form method=\"post\" action=\"/feedback\"><input type=\"hidden\" name=\"choice\" value=\"yes\">\
<button type=\"submit\">✅ Yes</button></form>\
<form method=\"post\" action=\"/feedback\"><input type=\"hidden\" name=\"choice\" value=\"no\">\
<button type=\"submit\">❌ No</button></form></div>\n",
        );
    }

    match state.feedback {
        FeedbackState::Yes => body.push_str("<div class=\"success\">🙂 Yeah!</div>\n"),
        FeedbackState::No => body.push_str("<div class=\"error\">😞 We are sorry</div>\n"),
        FeedbackState::Unset => {}
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
<title>Sentiment Analysis &amp; Model Monitoring</title><style>{}</style></head>\n\
<body>\n{}</body></html>\n",
        STYLE, body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Prediction, SentimentLabel};

    #[test]
    fn test_idle_page_has_form_and_no_buttons() {
        let html = render_page(&SessionState::default());
        assert!(html.contains("Analyze Sentiment"));
        assert!(html.contains("I love this!"));
        assert!(!html.contains("Was this prediction correct?"));
    }

    #[test]
    fn test_result_with_buttons_before_feedback() {
        let mut state = SessionState::default();
        state.prediction = Some(Prediction::new(SentimentLabel::Positive, 0.9987));
        let html = render_page(&state);
        assert!(html.contains("Predicted Sentiment: POSITIVE 😊"));
        assert!(html.contains("Confidence: 1.00"));
        assert!(html.contains("value=\"yes\""));
        assert!(html.contains("value=\"no\""));
    }

    #[test]
    fn test_buttons_withdrawn_after_feedback() {
        let mut state = SessionState::default();
        state.prediction = Some(Prediction::new(SentimentLabel::Negative, 0.61));
        state.feedback = FeedbackState::No;
        let html = render_page(&state);
        assert!(html.contains("😡"));
        assert!(html.contains("Confidence: 0.61"));
        assert!(html.contains("😞 We are sorry"));
        assert!(!html.contains("Was this prediction correct?"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mut state = SessionState::default();
        state.input_text = "<script>alert('x')</script>".to_string();
        state.last_error = Some("bad <input>".to_string());
        let html = render_page(&state);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("bad &lt;input&gt;"));
    }
}
