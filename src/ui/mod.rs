pub mod chat_loop;
pub mod repl;
