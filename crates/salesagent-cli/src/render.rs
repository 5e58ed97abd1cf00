use std::io::{self, Write};

use bat::WrappingMode;
use console::style;
use salesagent::session::OutputSink;
use serde_json::Value;

/// Terminal sink: streamed agent tokens in blue as they arrive, notices in
/// green, failures in magenta, and tool requests as framed JSON panels.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        ConsoleSink
    }
}

impl OutputSink for ConsoleSink {
    fn token(&mut self, text: &str) {
        print!("{}", style(text).blue());
        io::stdout().flush().expect("Failed to flush stdout");
    }

    fn notice(&mut self, message: &str) {
        println!("{}", style(message).green());
    }

    fn error(&mut self, message: &str) {
        println!("{}", style(message).magenta());
    }

    fn tool_call(&mut self, name: &str, arguments: &Value) {
        println!();
        print_tool_request(
            &serde_json::to_string_pretty(arguments).unwrap_or_default(),
            name,
        );
    }
}

fn print_tool_request(content: &str, tool_name: &str) {
    bat::PrettyPrinter::new()
        .input(
            bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Request: {}", tool_name)),
        )
        .theme("zenburn")
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();
}
