use sentiment_monitor::{
    AppMetrics, ClassifierError, Classify, Event, FeedbackChoice, FeedbackState, InteractionController,
    InteractionState, MetricsRegistry, Outcome, Prediction, SentimentLabel, SessionState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers like the SST-2 model does for a few known sentences.
struct ScriptedClassifier {
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl Classify for ScriptedClassifier {
    fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match text {
            "I love this!" => Ok(Prediction::new(SentimentLabel::Positive, 0.9999)),
            "This is awful" => Ok(Prediction::new(SentimentLabel::Negative, 0.9971)),
            "\u{0}" => Err(ClassifierError::PredictionError("malformed input".into())),
            _ => Ok(Prediction::new(SentimentLabel::Neutral, 0.55)),
        }
    }
}

fn setup() -> (MetricsRegistry, InteractionController, Arc<ScriptedClassifier>) {
    let registry = MetricsRegistry::new();
    let metrics = AppMetrics::init(&registry).unwrap();
    let classifier = Arc::new(ScriptedClassifier::new());
    let controller = InteractionController::new(classifier.clone(), metrics);
    (registry, controller, classifier)
}

/// Value of the sample line `series` (name plus labels) in the exposition text.
fn sample(registry: &MetricsRegistry, series: &str) -> Option<f64> {
    let text = registry.encode().unwrap();
    text.lines()
        .find_map(|line| line.strip_prefix(series)?.strip_prefix(' '))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

fn analyze(text: &str) -> Event {
    Event::Analyze { text: text.to_string() }
}

#[test]
fn test_classify_positive_records_request_and_confidence() {
    let (registry, controller, _) = setup();
    let mut state = SessionState::default();

    let outcome = controller.handle(&mut state, analyze("I love this!"));

    match outcome {
        Outcome::Classified(prediction) => {
            assert_eq!(prediction.label, SentimentLabel::Positive);
            assert!(prediction.confidence > 0.99);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(sample(&registry, "ml_model_requests_total"), Some(1.0));
    assert_eq!(sample(&registry, "ml_model_confidence_count{label=\"POSITIVE\"}"), Some(1.0));
    assert_eq!(sample(&registry, "ml_model_confidence_count{label=\"NEGATIVE\"}"), None);
    assert_eq!(state.phase(), InteractionState::AwaitingFeedback);
}

#[test]
fn test_no_feedback_after_positive() {
    let (registry, controller, _) = setup();
    let mut state = SessionState::default();
    controller.handle(&mut state, analyze("I love this!"));

    let outcome = controller.handle(&mut state, Event::Feedback(FeedbackChoice::No));

    assert_eq!(outcome, Outcome::FeedbackAccepted(FeedbackChoice::No));
    assert_eq!(state.feedback, FeedbackState::No);
    assert_eq!(state.accuracy_history.len(), 1);
    assert_eq!(state.accuracy_history[0].correct, 0);
    assert_eq!(state.no_count, 1);
    assert_eq!(sample(&registry, "ml_model_accuracy_feedback_count"), Some(1.0));
    assert_eq!(sample(&registry, "ml_model_accuracy_feedback_sum"), Some(0.0));
}

#[test]
fn test_two_predictions_without_feedback() {
    let (registry, controller, classifier) = setup();
    let mut state = SessionState::default();

    controller.handle(&mut state, analyze("I love this!"));
    assert_eq!(state.feedback, FeedbackState::Unset);
    controller.handle(&mut state, analyze("This is awful"));
    assert_eq!(state.feedback, FeedbackState::Unset);

    assert!(state.accuracy_history.is_empty());
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    assert_eq!(sample(&registry, "ml_model_requests_total"), Some(2.0));
    assert_eq!(state.prediction.map(|p| p.label), Some(SentimentLabel::Negative));
}

#[test]
fn test_history_length_matches_accepted_feedback() {
    let (registry, controller, _) = setup();
    let mut state = SessionState::default();
    let choices = [FeedbackChoice::Yes, FeedbackChoice::No, FeedbackChoice::Yes, FeedbackChoice::Yes];

    for choice in choices {
        controller.handle(&mut state, analyze("anything"));
        controller.handle(&mut state, Event::Feedback(choice));
        // Repeated clicks must not be double counted
        assert_eq!(
            controller.handle(&mut state, Event::Feedback(choice)),
            Outcome::FeedbackIgnored
        );
    }

    let recorded: Vec<u8> = state.accuracy_history.iter().map(|e| e.correct).collect();
    assert_eq!(recorded, vec![1, 0, 1, 1]);
    assert_eq!((state.yes_count, state.no_count), (3, 1));
    assert_eq!(sample(&registry, "ml_model_accuracy_feedback_count"), Some(4.0));
    assert_eq!(sample(&registry, "ml_model_accuracy_feedback_sum"), Some(3.0));
    assert!(state
        .accuracy_history
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_feedback_reset_by_new_prediction_regardless_of_state() {
    let (_, controller, _) = setup();
    let mut state = SessionState::default();

    controller.handle(&mut state, analyze("I love this!"));
    controller.handle(&mut state, Event::Feedback(FeedbackChoice::Yes));
    assert_eq!(state.phase(), InteractionState::FeedbackGiven);

    controller.handle(&mut state, analyze("This is awful"));
    assert_eq!(state.feedback, FeedbackState::Unset);
    assert_eq!(state.phase(), InteractionState::AwaitingFeedback);
}

#[test]
fn test_classifier_failure_is_surfaced_and_state_kept() {
    let (registry, controller, _) = setup();
    let mut state = SessionState::default();
    controller.handle(&mut state, analyze("I love this!"));
    let before = state.clone();

    let outcome = controller.handle(&mut state, analyze("\u{0}"));

    assert!(matches!(outcome, Outcome::ClassificationFailed(ref msg) if msg.contains("malformed input")));
    assert_eq!(state.prediction, before.prediction);
    assert_eq!(state.feedback, before.feedback);
    assert_eq!(state.accuracy_history, before.accuracy_history);
    assert!(state.last_error.is_some());
    // Only the successful call produced a confidence observation
    assert_eq!(sample(&registry, "ml_model_confidence_count{label=\"POSITIVE\"}"), Some(1.0));

    // The user can retry and still give feedback on the earlier result
    assert_eq!(
        controller.handle(&mut state, Event::Feedback(FeedbackChoice::Yes)),
        Outcome::FeedbackAccepted(FeedbackChoice::Yes)
    );
}

#[test]
fn test_sessions_share_metrics_but_not_state() {
    let (registry, controller, _) = setup();
    let mut alice = SessionState::default();
    let mut bob = SessionState::default();

    controller.handle(&mut alice, analyze("I love this!"));
    controller.handle(&mut bob, analyze("This is awful"));
    controller.handle(&mut alice, Event::Feedback(FeedbackChoice::Yes));

    assert_eq!(bob.feedback, FeedbackState::Unset);
    assert!(bob.accuracy_history.is_empty());
    assert_eq!(sample(&registry, "ml_model_requests_total"), Some(2.0));
}

#[test]
fn test_concurrent_sessions_on_shared_metrics() {
    let (registry, controller, _) = setup();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let controller = controller.clone();
            std::thread::spawn(move || {
                let mut state = SessionState::default();
                for _ in 0..25 {
                    controller.handle(&mut state, Event::Analyze { text: "I love this!".into() });
                    controller.handle(&mut state, Event::Feedback(FeedbackChoice::Yes));
                }
                state.accuracy_history.len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 25);
    }
    assert_eq!(sample(&registry, "ml_model_requests_total"), Some(100.0));
    assert_eq!(sample(&registry, "ml_model_accuracy_feedback_count"), Some(100.0));
}
