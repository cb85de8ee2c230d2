//! Line input for interactive chat
//!
//! rustyline blocks, so it runs on its own thread and hands lines over a
//! channel. The next prompt is shown only after the caller asks for it, so
//! it never interleaves with streamed output.

use std::sync::mpsc as std_mpsc;
use std::thread;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

pub enum Input {
    Line(String),
    /// Ctrl-C or Ctrl-D at the prompt
    Exit,
}

pub struct Prompt {
    lines: mpsc::UnboundedReceiver<Input>,
    next: std_mpsc::Sender<()>,
}

impl Prompt {
    pub fn spawn(prompt: String) -> anyhow::Result<Self> {
        let (line_tx, lines) = mpsc::unbounded_channel();
        let (next, next_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready) = std_mpsc::channel();

        thread::Builder::new()
            .name("relay-prompt".to_string())
            .spawn(move || {
                let mut editor = match DefaultEditor::new() {
                    Ok(editor) => {
                        let _ = ready_tx.send(Ok(()));
                        editor
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while next_rx.recv().is_ok() {
                    let input = match editor.readline(&prompt) {
                        Ok(line) => {
                            if !line.trim().is_empty() {
                                let _ = editor.add_history_entry(line.as_str());
                            }
                            Input::Line(line)
                        }
                        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Input::Exit,
                        Err(e) => {
                            tracing::warn!("Failed to read input: {}", e);
                            Input::Exit
                        }
                    };
                    let exit = matches!(input, Input::Exit);
                    if line_tx.send(input).is_err() || exit {
                        break;
                    }
                }
            })?;

        ready.recv()??;
        Ok(Self { lines, next })
    }

    /// Show the prompt and wait for the next line
    pub async fn read(&mut self) -> Input {
        if self.next.send(()).is_err() {
            return Input::Exit;
        }
        self.lines.recv().await.unwrap_or(Input::Exit)
    }
}
