//! Model management through the local `ollama` executable.

use anyhow::{bail, Context, Result};
use std::process::Command;

/// Executable invoked by [`pull_model`] and [`remove_model`].
pub const OLLAMA_BIN: &str = "ollama";

/// `pull_model` command: download `model` into the local Ollama store.
pub fn pull_model(model: &str) -> Result<()> {
    println!("Pulling model: {}\n", model);
    let stdout = run_model_command(OLLAMA_BIN, "pull", model)
        .with_context(|| "Error pulling model")?;
    println!("{}", stdout);
    Ok(())
}

/// `remove_model` command: delete `model` from the local Ollama store.
pub fn remove_model(model: &str) -> Result<()> {
    println!("Removing model: {}\n", model);
    let stdout = run_model_command(OLLAMA_BIN, "rm", model)
        .with_context(|| "Error removing model")?;
    println!("{}", stdout);
    Ok(())
}

/// Run `<program> <action> <model>` and return its stdout.
///
/// A non-zero exit becomes an error carrying the tool's stderr.
pub fn run_model_command(program: &str, action: &str, model: &str) -> Result<String> {
    let output = Command::new(program)
        .arg(action)
        .arg(model)
        .output()
        .with_context(|| format!("Failed to run '{}' (is it installed and on PATH?)", program))?;

    if !output.status.success() {
        bail!(
            "'{} {} {}' exited with {}:\n{}",
            program,
            action,
            model,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_stdout_on_success() {
        let out = run_model_command("echo", "pull", "llama3.2:1b").unwrap();
        assert_eq!(out.trim(), "pull llama3.2:1b");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let err = run_model_command("false", "rm", "missing-model").unwrap_err();
        assert!(err.to_string().contains("'false rm missing-model' exited with"));
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = run_model_command("health-rag-no-such-ollama", "pull", "m").unwrap_err();
        assert!(err.to_string().contains("is it installed"));
    }
}
