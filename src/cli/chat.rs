// src/cli/chat.rs — One-shot questions and the interactive chat REPL

use crate::chat::{ChatScope, ChatSessionManager, ChatTurn};

fn scope_for(report: Option<&str>) -> ChatScope {
    match report {
        Some(name) => ChatScope::ReportBound(name.to_string()),
        None => ChatScope::ProjectGeneral,
    }
}

/// Answer a single question and print it to stdout.
pub async fn run_ask(
    manager: &ChatSessionManager,
    report: Option<&str>,
    message: &str,
) -> anyhow::Result<()> {
    let answer = manager.ask(&scope_for(report), message, &[]).await?;
    println!("{}", answer);
    Ok(())
}

/// Run the interactive chat REPL. History lives only for this session.
pub async fn run_chat(manager: &ChatSessionManager, report: Option<&str>) -> anyhow::Result<()> {
    let scope = scope_for(report);
    match &scope {
        ChatScope::ReportBound(name) => {
            eprintln!("actionlens v{} | chatting about {}", env!("CARGO_PKG_VERSION"), name)
        }
        ChatScope::ProjectGeneral => {
            eprintln!("actionlens v{} | ask how to use ActionLens", env!("CARGO_PKG_VERSION"))
        }
    }
    eprintln!("Type /clear to reset history, quit to exit.\n");

    let mut history: Vec<ChatTurn> = Vec::new();
    while let Some(input) = read_input() {
        let trimmed = input.trim();

        if trimmed == "quit" || trimmed == "exit" || trimmed == "/quit" {
            break;
        }
        if trimmed == "/clear" {
            history.clear();
            eprintln!("(history cleared)");
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        match manager.ask(&scope, trimmed, &history).await {
            Ok(answer) => {
                println!("{}\n", answer);
                history.push(ChatTurn::user(trimmed));
                history.push(ChatTurn::assistant(answer));
            }
            // A missing report will not appear mid-session.
            Err(e @ crate::infra::errors::ActionLensError::ReportNotFound { .. }) => {
                return Err(e.into());
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    eprintln!("\nSession total: {} exchange(s)", history.len() / 2);
    Ok(())
}

fn read_input() -> Option<String> {
    use std::io::{self, BufRead, Write};

    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) => None, // EOF
        Ok(_) => Some(line),
        Err(_) => None,
    }
}
