#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use async_openai::{
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest,
    },
};

use super::grader::GradingOptions;
use crate::exam::{Question, QuestionSet};

/// A completion request for one student answer.
#[derive(Debug, Clone)]
pub struct GradingRequest {
    /// Ordinal of the question being graded.
    pub question:              usize,
    /// Model identifier.
    pub model:                 String,
    /// Teacher persona.
    pub system:                String,
    /// Guideline, verbatim answer and output rules.
    pub user:                  String,
    /// Optional bound on completion length.
    pub max_completion_tokens: Option<u32>,
    /// Optional sampling temperature.
    pub temperature:           Option<f32>,
    /// Optional nucleus sampling bound.
    pub top_p:                 Option<f32>,
}

impl GradingRequest {
    /// Builds the request for `answer` to `question` of `set`. The answer is
    /// embedded as given.
    pub fn new(
        set: &QuestionSet,
        question: &Question,
        answer: &str,
        options: &GradingOptions,
    ) -> Self {
        let user = format!(
            include_str!("../exam/prompts/user_message.md"),
            topic = set.topic,
            index = question.index,
            prompt = question.prompt,
            guideline = question.guideline,
            answer = answer,
        );

        Self {
            question: question.index,
            model: options.model.clone(),
            system: set.system_message.clone(),
            user,
            max_completion_tokens: options.max_completion_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        }
    }

    /// Converts into an OpenAI chat completion request.
    pub fn to_openai(&self) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(self.user.clone())
                .build()?
                .into(),
        ];

        Ok(CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_completion_tokens: self.max_completion_tokens,
            n: Some(1),
            stream: Some(false),
            ..Default::default()
        })
    }
}
