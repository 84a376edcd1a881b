//! Interactive terminal chat.
//!
//! Reads one question per line, prints `Bot: <reply>`, and stops on an exit
//! keyword or end of input. With a retriever attached every question is
//! answered through [`Bot::ask_with_docs`].

use anyhow::Result;
use std::io::{BufRead, ErrorKind, Write};

use crate::generator::Bot;
use crate::retriever::Retriever;

const EXIT_KEYWORDS: [&str; 3] = ["salir", "exit", "quit"];

pub fn is_exit_keyword(line: &str) -> bool {
    let line = line.trim();
    EXIT_KEYWORDS.iter().any(|k| line.eq_ignore_ascii_case(k))
}

/// Run the loop until an exit keyword or end of input.
///
/// Read failures on a single line and degraded replies are logged and the
/// loop goes on; only a non-recoverable read error ends it early.
pub async fn run_loop<R: BufRead, W: Write>(
    bot: &mut Bot,
    retriever: Option<&Retriever>,
    mut input: R,
    mut output: W,
) -> Result<()> {
    let mode = if retriever.is_some() { "RAG bot" } else { "Bot" };
    writeln!(output, "{} ready (type 'exit' to quit)\n", mode)?;

    let mut line = String::new();
    loop {
        if let Err(e) = write!(output, "You: ").and_then(|_| output.flush()) {
            tracing::warn!("failed to write prompt: {}", e);
        }

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::InvalidData || e.kind() == ErrorKind::Interrupted => {
                tracing::warn!("skipping unreadable input line: {}", e);
                continue;
            }
            Err(e) => {
                tracing::error!("stopping chat, input failed: {}", e);
                break;
            }
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_keyword(question) {
            writeln!(output, "Bot: Goodbye")?;
            return Ok(());
        }

        let reply = match retriever {
            Some(retriever) => {
                let docs = retriever.search(question, None).await;
                bot.ask_with_docs(question, &docs).await
            }
            None => bot.ask(question).await,
        };
        if reply.is_degraded() {
            tracing::warn!("answered with fallback text");
        }

        if let Err(e) = writeln!(output, "Bot: {}", reply.text()) {
            tracing::warn!("failed to write reply: {}", e);
        }
    }

    writeln!(output)?;
    Ok(())
}
