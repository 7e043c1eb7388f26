// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use runa_core::{Agent, InMemorySession, RunConfig, RunError, RunEvent, Runner};
use runa_model::StreamEvent;

/// A minimal interactive loop over stdin: each line becomes one run of
/// `agent`, with conversation memory kept in an in-process session.
///
/// With `stream` set, assistant text is printed as it is generated;
/// otherwise each turn prints the final output once. Exit with an empty
/// line, `exit`, or end-of-input.
pub async fn run_demo_loop(agent: Arc<Agent>, stream: bool) -> Result<(), RunError> {
    let session = Arc::new(InMemorySession::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await.ok();
        stdout.flush().await.ok();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let line = line.trim().to_string();
        if line.is_empty() || line == "exit" || line == "quit" {
            break;
        }

        let runner = Runner::with_config(RunConfig::new().with_session(session.clone()));
        if stream {
            let mut handle = runner.run_streamed(Arc::clone(&agent), line);
            while let Some(event) = handle.next_event().await {
                match event {
                    RunEvent::RawResponses {
                        event: StreamEvent::OutputTextDelta { delta },
                    } => {
                        stdout.write_all(delta.as_bytes()).await.ok();
                        stdout.flush().await.ok();
                    }
                    RunEvent::AgentUpdated { new_agent } => {
                        stdout
                            .write_all(format!("[agent: {}]\n", new_agent.name).as_bytes())
                            .await
                            .ok();
                    }
                    _ => {}
                }
            }
            stdout.write_all(b"\n").await.ok();
            handle.final_result().await?;
        } else {
            let result = runner.run(Arc::clone(&agent), line).await?;
            stdout
                .write_all(format!("{}\n", result.final_output_text()).as_bytes())
                .await
                .ok();
        }
    }
    Ok(())
}
