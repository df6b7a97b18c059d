//! Line-oriented chat loop.

use crate::core::dispatcher::{handle_turn, TurnOutcome};
use crate::core::session::SharedSession;
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const PROMPT: &str = "\nEnter your question: ";
pub const FAREWELL: &str = "Exiting GitHub agent chat.";

pub fn print_banner<W: Write>(output: &mut W, tool_count: usize) -> io::Result<()> {
    writeln!(output, "Loaded {tool_count} MCP tools from the GitHub MCP server.")?;
    writeln!(output, "GitHub agent is ready. Ask a question about your repositories.")?;
    writeln!(output, "Type 'exit', 'quit', or 'q' to stop.")
}

/// Reads one question per line until an exit keyword or end of input. Each
/// line is answered before the next is read.
pub async fn run_repl<R, W>(session: &SharedSession, input: R, output: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            return Ok(());
        };

        let outcome = {
            let mut session = session.lock().await;
            handle_turn(&mut session, &line).await
        };

        match outcome {
            TurnOutcome::Ignored => {}
            TurnOutcome::Exit => {
                writeln!(output, "{FAREWELL}")?;
                return Ok(());
            }
            TurnOutcome::Reply(reply) => {
                writeln!(output, "\n{}", reply.text)?;
            }
        }
    }
}
