use serde::{Deserialize, Serialize};

/// Template of the secondary pass which asks the model to judge a prior result.
pub const EVALUATION_TEMPLATE: &str =
    r#"Evaluate this result: "%s". Is it accurate? Respond Yes/No with a brief explanation."#;

/// Task is the kind of batch inference applied to the selected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    SentimentAnalysis,
    TopicClassification,
    Summarization,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown task {0:?} (expected one of sentiment-analysis, topic-classification, summarization)")]
pub struct UnknownTask(pub String);

impl Task {
    pub const ALL: [Task; 3] = [
        Task::SentimentAnalysis,
        Task::TopicClassification,
        Task::Summarization,
    ];

    /// Stable, kebab-case name of the task.
    pub fn name(&self) -> &'static str {
        match self {
            Task::SentimentAnalysis => "sentiment-analysis",
            Task::TopicClassification => "topic-classification",
            Task::Summarization => "summarization",
        }
    }

    /// Human-readable label of the task.
    pub fn label(&self) -> &'static str {
        match self {
            Task::SentimentAnalysis => "Sentiment Analysis",
            Task::TopicClassification => "Topic Classification",
            Task::Summarization => "Summarization",
        }
    }

    /// Prompt template of the task, in the remote engine's `format_string`
    /// syntax. Each template has exactly one `%s` placeholder, which is
    /// bound to the row's column value by the engine.
    pub fn template(&self) -> &'static str {
        match self {
            Task::SentimentAnalysis => {
                r#"Determine the sentiment (positive/negative/neutral) of: "%s""#
            }
            Task::TopicClassification => r#"Classify the topic of: "%s""#,
            Task::Summarization => r#"Summarize the following text: "%s""#,
        }
    }
}

impl std::str::FromStr for Task {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.name() == s || task.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Render `template` for a single `value`, as the remote engine would.
/// Only used for local previews: batch prompts are always formatted remotely.
pub fn render_prompt(template: &str, value: &str) -> String {
    template.replacen("%s", value, 1)
}
