use anyhow::Result;
use console::style;
use rustyline::error::ReadlineError;

/// One line of user input, classified. Blank lines re-prompt without
/// opening an exchange; `exit` and `save` end the session (the latter
/// retaining the remote resources).
#[derive(Debug, Clone, PartialEq)]
pub enum UserInput {
    Message(String),
    Exit,
    Save,
    AskAgain,
}

pub fn read_input() -> Result<UserInput> {
    let mut editor = rustyline::DefaultEditor::new()?;
    let prompt = format!(
        "\n{} ",
        style("Enter your query (type exit or save to finish):").green()
    );
    match editor.readline(&prompt) {
        Ok(line) => Ok(classify(&line)),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(UserInput::Exit),
        Err(e) => {
            eprintln!("Input error: {e}");
            Ok(UserInput::Exit)
        }
    }
}

fn classify(line: &str) -> UserInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        UserInput::AskAgain
    } else if trimmed.eq_ignore_ascii_case("exit") {
        UserInput::Exit
    } else if trimmed.eq_ignore_ascii_case("save") {
        UserInput::Save
    } else {
        UserInput::Message(trimmed.to_string())
    }
}
