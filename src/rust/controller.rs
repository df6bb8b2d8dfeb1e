//! The analyze/feedback state machine.
//!
//! [`step`] applies one [`Event`] to a [`SessionState`] and returns the metric
//! [`Effect`]s it produced without touching any instrument.
//! [`InteractionController`] runs `step` and applies the effects to [`AppMetrics`].
//!
//! States: `Idle` → `AwaitingFeedback` on a completed classification,
//! `AwaitingFeedback` → `FeedbackGiven` on the first yes/no, and back to
//! `AwaitingFeedback` on the next classification.

use std::sync::Arc;
use std::time::SystemTime;

use crate::classifier::{Classify, Prediction, SentimentLabel};
use crate::metrics::AppMetrics;
use crate::session::{AccuracyEntry, FeedbackChoice, FeedbackState, InteractionState, SessionState};

/// A user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Analyze { text: String },
    Feedback(FeedbackChoice),
}

/// A metric observation requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    RequestReceived,
    ConfidenceObserved { label: SentimentLabel, confidence: f32 },
    FeedbackObserved(FeedbackChoice),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Classified(Prediction),
    /// Session state is unchanged apart from the inline error
    ClassificationFailed(String),
    FeedbackAccepted(FeedbackChoice),
    /// No prediction is awaiting feedback; nothing was recorded
    FeedbackIgnored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub outcome: Outcome,
    pub effects: Vec<Effect>,
}

/// Applies `event` to `state`, calling `classifier` for analyze events.
pub fn step(state: &mut SessionState, event: Event, classifier: &dyn Classify) -> Transition {
    match event {
        Event::Analyze { text } => {
            // Requests are counted whether or not classification succeeds
            let mut effects = vec![Effect::RequestReceived];
            let outcome = match classifier.classify(&text) {
                Ok(prediction) => {
                    state.prediction = Some(prediction);
                    state.feedback = FeedbackState::Unset;
                    state.last_error = None;
                    effects.push(Effect::ConfidenceObserved {
                        label: prediction.label,
                        confidence: prediction.confidence,
                    });
                    Outcome::Classified(prediction)
                }
                Err(e) => {
                    log::warn!("Classification failed: {}", e);
                    let message = e.to_string();
                    state.last_error = Some(message.clone());
                    Outcome::ClassificationFailed(message)
                }
            };
            state.input_text = text;
            Transition { outcome, effects }
        }
        Event::Feedback(choice) => {
            if state.phase() != InteractionState::AwaitingFeedback {
                log::debug!("Ignoring {:?} feedback in state {:?}", choice, state.phase());
                return Transition {
                    outcome: Outcome::FeedbackIgnored,
                    effects: Vec::new(),
                };
            }

            state.accuracy_history.push(AccuracyEntry {
                timestamp: SystemTime::now(),
                correct: u8::from(choice.is_correct()),
            });
            state.feedback = FeedbackState::from(choice);
            match choice {
                FeedbackChoice::Yes => state.yes_count += 1,
                FeedbackChoice::No => state.no_count += 1,
            }

            Transition {
                outcome: Outcome::FeedbackAccepted(choice),
                effects: vec![Effect::FeedbackObserved(choice)],
            }
        }
    }
}

/// Runs events against session state and records their metrics.
#[derive(Clone)]
pub struct InteractionController {
    classifier: Arc<dyn Classify>,
    metrics: AppMetrics,
}

impl InteractionController {
    pub fn new(classifier: Arc<dyn Classify>, metrics: AppMetrics) -> Self {
        Self { classifier, metrics }
    }

    /// Handles one event. Blocks for the duration of the classifier call.
    pub fn handle(&self, state: &mut SessionState, event: Event) -> Outcome {
        let transition = step(state, event, self.classifier.as_ref());
        self.apply(&transition.effects);
        transition.outcome
    }

    pub fn apply(&self, effects: &[Effect]) {
        for effect in effects {
            match *effect {
                Effect::RequestReceived => self.metrics.record_request(),
                Effect::ConfidenceObserved { label, confidence } => {
                    self.metrics.record_confidence(label, confidence)
                }
                Effect::FeedbackObserved(choice) => self.metrics.record_feedback(choice.is_correct()),
            }
        }
    }
}
