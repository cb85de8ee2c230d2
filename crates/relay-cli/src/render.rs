//! Terminal rendering of backend events

use std::io::Write;

use console::style;
use relay_core::{
    DiffEvent, DiffOperation, DoneEvent, ErrorEvent, Event, EventListener, TokenEvent,
    ToolCallEvent, ToolResultEvent, UnknownEvent,
};

/// Prints events as they arrive; tokens are streamed inline
pub struct ConsoleListener {
    show_tool_calls: bool,
}

impl ConsoleListener {
    pub fn new(show_tool_calls: bool) -> Self {
        Self { show_tool_calls }
    }
}

impl EventListener for ConsoleListener {
    fn on_token(&self, event: &TokenEvent) {
        print!("{}", event.text);
        let _ = std::io::stdout().flush();
    }

    fn on_tool_call(&self, event: &ToolCallEvent) {
        if self.show_tool_calls {
            println!();
            println!("  {} {}", style("[Executing:").dim(), style(&event.tool).yellow());
            if !event.input.is_empty() {
                let input = serde_json::to_string(&event.input).unwrap_or_default();
                println!("    {}", style(truncate(&input, 120)).dim());
            }
        }
    }

    fn on_tool_result(&self, event: &ToolResultEvent) {
        if self.show_tool_calls {
            println!(
                "  {} {}",
                style("✓").green(),
                style(format!("{} completed", event.tool)).dim()
            );
        }
    }

    fn on_diff(&self, event: &DiffEvent) {
        println!();
        println!("{}", style("Proposed changes:").bold());
        for file in &event.files {
            let (marker, label) = match file.operation() {
                DiffOperation::Create => (style("+").green(), "create"),
                DiffOperation::Modify => (style("~").yellow(), "modify"),
                DiffOperation::Delete => (style("-").red(), "delete"),
            };
            println!("  {} {} {}", marker, file.path, style(format!("({})", label)).dim());
        }
    }

    fn on_error(&self, event: &ErrorEvent) {
        println!();
        println!("{}", style(format!("Error: {}", event.message)).red());
    }

    fn on_done(&self, _event: &DoneEvent) {
        println!();
    }

    fn on_unknown(&self, event: &UnknownEvent) {
        tracing::debug!("Ignoring '{}' event from backend", event.event_type);
    }
}

/// Render one event without a dispatcher
pub fn print_event(listener: &ConsoleListener, event: &Event) {
    match event {
        Event::Token(e) => listener.on_token(e),
        Event::ToolCall(e) => listener.on_tool_call(e),
        Event::ToolResult(e) => listener.on_tool_result(e),
        Event::Diff(e) => listener.on_diff(e),
        Event::Error(e) => listener.on_error(e),
        Event::Done(e) => listener.on_done(e),
        Event::Unknown(e) => listener.on_unknown(e),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }
}
