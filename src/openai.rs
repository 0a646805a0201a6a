use reqwest::Client;
use serde::{Deserialize, Serialize};
use log::{info, error, debug};

use crate::config::Config;
use crate::error::{AppError, Result};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Sends a single user prompt and returns the assistant's answer.
pub async fn chat(client: &Client, config: &Config, prompt: &str) -> Result<String> {
    let request = ChatRequest {
        model: &config.openai_model,
        messages: vec![
            ChatMessage { role: "system", content: SYSTEM_PROMPT },
            ChatMessage { role: "user", content: prompt },
        ],
    };

    info!("Sending chat completion request to model {}", config.openai_model);
    debug!("Prompt: {}", prompt);

    let response = client
        .post(config.chat_completions_url())
        .bearer_auth(&config.openai_api_key)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("OpenAI request failed. Status: {}", status);
        error!("Error body: {}", body);
        return Err(AppError::upstream("OpenAI", format!("{} - {}", status, body)));
    }

    let completion = response.json::<ChatCompletion>().await?;
    let answer = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    debug!("Model answer: {}", answer);
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer openai-test-key")
                    .json_body_partial(r#"{"model": "gpt-3.5-turbo", "messages": [{"role": "system", "content": "You are a helpful assistant."}, {"role": "user", "content": "Hi"}]}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        {"message": {"role": "assistant", "content": "Hello!"}},
                        {"message": {"role": "assistant", "content": "Other"}}
                    ]
                }));
            })
            .await;

        let config = test_config("http://unused", &server.base_url());
        let answer = chat(&Client::new(), &config, "Hi").await.unwrap();
        mock.assert_async().await;
        assert_eq!(answer, "Hello!");
    }

    #[tokio::test]
    async fn empty_choices_give_empty_answer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let config = test_config("http://unused", &server.base_url());
        assert_eq!(chat(&Client::new(), &config, "Hi").await.unwrap(), "");
    }

    #[tokio::test]
    async fn non_success_is_upstream_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let config = test_config("http://unused", &server.base_url());
        let err = chat(&Client::new(), &config, "Hi").await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }
}
