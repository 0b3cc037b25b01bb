use std::io::Write as _;
use std::sync::Arc;

use futures::StreamExt as _;
use relay_core::prelude::*;
use relay_core::vendors::openai::OpenAiEngine;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = if prompt.trim().is_empty() {
        "I need to solve the equation `3x + 11 = 14`. Can you help me?".to_string()
    } else {
        prompt
    };

    let engine = Arc::new(OpenAiEngine::from_env()?);
    let assistant = engine
        .create_assistant(&AssistantSpec::new(
            "Math Tutor",
            "You are a personal math tutor. Write and run code to answer math questions.",
            "gpt-4o",
        ))
        .await?;
    let relay = Relay::builder()
        .engine(engine)
        .assistant(assistant)
        .run_instructions("Please address the user as Jane Doe. The user has a premium account.")
        .build()?;

    let mut frames = relay
        .open_stream(&ClientId::new("example"), &prompt)
        .await?
        .into_frames();
    let mut stdout = std::io::stdout();
    while let Some(frame) = frames.next().await {
        if frame.is_done() {
            println!();
            break;
        }
        if frame.is_error() {
            eprintln!("run error: {}", frame.data);
            continue;
        }
        print!("{}", frame.data);
        let _ = stdout.flush();
    }
    Ok(())
}
