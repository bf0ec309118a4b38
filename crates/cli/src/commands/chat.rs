//! `persona chat`: one question, answered with the owner's credential.

use crate::runtime::Runtime;
use persona_agent::{ChatOptions, ChatStreamEvent};
use persona_core::message::Message;
use std::io::Write;

pub async fn run(
    owner: &str,
    message: &str,
    stream: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load().await?;
    let messages = [Message::user(message)];
    let options = ChatOptions::default();

    if stream {
        let mut reply = runtime
            .assistant
            .chat_stream(owner, &messages, &options)
            .await?;
        let mut stdout = std::io::stdout();
        while let Some(event) = reply.next_event().await {
            match event {
                ChatStreamEvent::Chunk { content } => {
                    write!(stdout, "{content}")?;
                    stdout.flush()?;
                }
                ChatStreamEvent::Done { model, attempt, .. } => {
                    println!();
                    eprintln!("  [{model}, attempt {attempt}]");
                }
                ChatStreamEvent::Error { message } => {
                    println!();
                    return Err(format!("Stream interrupted: {message}").into());
                }
            }
        }
        return Ok(());
    }

    let outcome = runtime.assistant.chat(owner, &messages, &options).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.success {
        println!("{}", outcome.response.unwrap_or_default());
        eprintln!(
            "  [{}, attempt {}]",
            outcome.model.unwrap_or_default(),
            outcome.attempt.unwrap_or_default()
        );
        Ok(())
    } else {
        let error = outcome.error.unwrap_or_default();
        let details = outcome.details.unwrap_or_default();
        if error == "no_credential" {
            eprintln!("  No usable credential for '{owner}'.");
            eprintln!("  Store one with: persona credential set -u {owner} --key <KEY>");
        }
        Err(format!("{error}: {details}").into())
    }
}
