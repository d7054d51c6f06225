//! Interactive chat with per-session memory.
//!
//! [`SessionManager`] keeps each session's message history in memory;
//! [`ChatAssistant`] replays that history to the model on every turn;
//! [`run_repl`] drives the terminal loop.

use anyhow::Result;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::llm::{ChatMessage, GenerationOptions, LanguageModel, OllamaChat};
use crate::service::ServiceError;

const GREEN: &str = "\x1b[92m";
const CYAN: &str = "\x1b[96m";
const RESET: &str = "\x1b[0m";

/// Session id used when none is given on the command line.
pub const DEFAULT_SESSION_ID: &str = "default_session";

/// In-memory conversation histories, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, Vec<ChatMessage>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages exchanged so far; empty for an unknown session.
    pub fn history(&self, session_id: &str) -> &[ChatMessage] {
        self.sessions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn append(&mut self, session_id: &str, message: ChatMessage) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn clear(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

/// A chat model with a fixed system prompt and session memory.
pub struct ChatAssistant {
    model: Box<dyn LanguageModel>,
    system_prompt: String,
    options: GenerationOptions,
    sessions: SessionManager,
}

impl ChatAssistant {
    pub fn new(
        model: Box<dyn LanguageModel>,
        system_prompt: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            options: GenerationOptions {
                temperature,
                num_predict: None,
            },
            sessions: SessionManager::new(),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn clear_session(&mut self, session_id: &str) {
        self.sessions.clear(session_id);
    }

    /// Send `[system, ...history, user]` and record the exchange.
    ///
    /// History is only extended when the model answers.
    pub async fn respond(&mut self, session_id: &str, input: &str) -> Result<String, ServiceError> {
        let history = self.sessions.history(session_id);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(input));

        let reply = self.model.chat(&messages, self.options).await?;
        self.sessions.append(session_id, ChatMessage::user(input));
        self.sessions
            .append(session_id, ChatMessage::assistant(reply.as_str()));
        Ok(reply)
    }
}

/// Animated `>> LLM: ...` written to a terminal while a reply is pending.
pub struct TypingIndicator<W> {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<W>,
}

/// Blanks the indicator line and returns the cursor to column 0.
fn clear_line() -> String {
    format!("\r{}\r", " ".repeat(40))
}

impl<W: Write + Send + 'static> TypingIndicator<W> {
    pub fn start(mut out: W, color: bool) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            let mut tick = 0usize;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let _ = write!(out, "{}", indicator_frame(tick, color));
                        let _ = out.flush();
                        tick += 1;
                    }
                }
            }
            let _ = write!(out, "{}", clear_line());
            let _ = out.flush();
            out
        });
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Signal the task and wait until it has cleared its line. Hands the
    /// writer back unless the task died.
    pub async fn stop(mut self) -> Option<W> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.ok()
    }
}

/// One animation frame: the dots cycle `.`, `..`, `...`, then none.
fn indicator_frame(tick: usize, color: bool) -> String {
    let dots = ".".repeat((tick + 1) % 4);
    if color {
        format!("\r{}>> LLM: {:<3}{}", CYAN, dots, RESET)
    } else {
        format!("\r>> LLM: {:<3}", dots)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplOptions {
    /// ANSI colours on the prompts.
    pub color: bool,
    pub typing_indicator: bool,
}

impl ReplOptions {
    /// Colours and animation only when stdout is a terminal.
    pub fn for_terminal() -> Self {
        let tty = atty::is(atty::Stream::Stdout);
        Self {
            color: tty,
            typing_indicator: tty,
        }
    }
}

fn paint(text: &str, color: &str, enabled: bool) -> String {
    if enabled {
        format!("{}{}{}", color, text, RESET)
    } else {
        text.to_string()
    }
}

/// Read prompts from `input` until `exit`, `quit`, or end of input.
///
/// `/clear` forgets the current session's history. Blank lines are
/// ignored. A failed model call ends the loop with that error.
pub async fn run_repl<R: BufRead, W: Write>(
    assistant: &mut ChatAssistant,
    session_id: &str,
    mut input: R,
    output: &mut W,
    options: ReplOptions,
) -> Result<()> {
    let rule = "=".repeat(60);
    writeln!(output, "{}", rule)?;
    writeln!(output, "Welcome to Chat Mode!")?;
    writeln!(output, "Type your questions or prompts below.")?;
    writeln!(output, "Session ID: {}", session_id)?;
    writeln!(output, "To end the session, type 'exit' or 'quit'. Type '/clear' to forget the conversation.")?;
    writeln!(output, "{}", rule)?;
    writeln!(output)?;

    let user_prompt = paint(">> User:", GREEN, options.color);
    let llm_prompt = paint(">> LLM:", CYAN, options.color);

    loop {
        write!(output, "{} ", user_prompt)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            writeln!(output, "Exiting chat.")?;
            break;
        }
        let text = line.trim_end_matches(['\r', '\n']);
        let command = text.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            writeln!(output, "Exiting chat.")?;
            break;
        }
        if command == "/clear" {
            assistant.clear_session(session_id);
            writeln!(output, "Session '{}' cleared.", session_id)?;
            continue;
        }

        let indicator = options
            .typing_indicator
            .then(|| TypingIndicator::start(std::io::stdout(), options.color));
        let reply = assistant.respond(session_id, text).await;
        if let Some(indicator) = indicator {
            indicator.stop().await;
        }
        writeln!(output, "{} {}", llm_prompt, reply?)?;
    }
    Ok(())
}

/// `chat_mode` command on the real terminal.
pub async fn run_chat_mode(config: &Config, session_id: &str) -> Result<()> {
    let model = OllamaChat::new(&config.llm)?;
    let mut assistant = ChatAssistant::new(
        Box::new(model),
        config.llm.system_prompt.as_str(),
        config.llm.chat_temperature,
    );
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_repl(
        &mut assistant,
        session_id,
        stdin.lock(),
        &mut stdout,
        ReplOptions::for_terminal(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Echoes the turn number and records every request.
    struct ScriptedModel {
        requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: GenerationOptions,
        ) -> Result<String, ServiceError> {
            if self.fail {
                return Err(ServiceError::Connect {
                    url: "http://localhost:11434/api/chat".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            Ok(format!("reply {}", requests.len()))
        }
    }

    fn assistant(fail: bool) -> (ChatAssistant, Arc<Mutex<Vec<Vec<ChatMessage>>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let model = ScriptedModel {
            requests: requests.clone(),
            fail,
        };
        (ChatAssistant::new(Box::new(model), "Be kind.", 0.7), requests)
    }

    const PLAIN: ReplOptions = ReplOptions {
        color: false,
        typing_indicator: false,
    };

    #[test]
    fn session_manager_isolates_sessions() {
        let mut sessions = SessionManager::new();
        assert!(sessions.history("a").is_empty());
        sessions.append("a", ChatMessage::user("hi"));
        sessions.append("b", ChatMessage::user("yo"));
        assert_eq!(sessions.history("a").len(), 1);
        sessions.clear("a");
        assert!(sessions.history("a").is_empty());
        assert_eq!(sessions.history("b").len(), 1);
    }

    #[tokio::test]
    async fn respond_replays_history() {
        let (mut assistant, requests) = assistant(false);
        assistant.respond("s", "first").await.unwrap();
        let reply = assistant.respond("s", "second").await.unwrap();
        assert_eq!(reply, "reply 2");

        let requests = requests.lock().unwrap();
        let roles: Vec<Role> = requests[1].iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(requests[1][0].content, "Be kind.");
        assert_eq!(requests[1][2].content, "reply 1");
        assert_eq!(requests[1][3].content, "second");
    }

    #[tokio::test]
    async fn failed_call_leaves_history_untouched() {
        let (mut assistant, _) = assistant(true);
        assert!(assistant.respond("s", "hello").await.is_err());
        assert!(assistant.sessions().history("s").is_empty());
    }

    #[tokio::test]
    async fn repl_handles_blank_clear_and_quit() {
        let (mut assistant, requests) = assistant(false);
        let input = b"hello\n\n   \n/clear\nagain\nQUIT\nnever sent\n";
        let mut output = Vec::new();
        run_repl(&mut assistant, "sess-1", &input[..], &mut output, PLAIN)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Session ID: sess-1"));
        assert!(text.contains(">> LLM: reply 1"));
        assert!(text.contains("Session 'sess-1' cleared."));
        assert!(text.contains(">> LLM: reply 2"));
        assert!(text.trim_end().ends_with("Exiting chat."));
        assert!(!text.contains('\x1b'));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        // After /clear the second turn carries no earlier history.
        assert_eq!(requests[1].len(), 2);
    }

    #[tokio::test]
    async fn repl_stops_at_end_of_input() {
        let (mut assistant, _) = assistant(false);
        let mut output = Vec::new();
        run_repl(&mut assistant, "s", &b"hi"[..], &mut output, PLAIN)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains(">> LLM: reply 1"));
        assert!(text.trim_end().ends_with("Exiting chat."));
    }

    #[tokio::test]
    async fn repl_propagates_model_failure() {
        let (mut assistant, _) = assistant(true);
        let mut output = Vec::new();
        let err = run_repl(&mut assistant, "s", &b"hi\n"[..], &mut output, PLAIN)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is Ollama running"));
    }

    #[tokio::test]
    async fn typing_indicator_stops_on_signal() {
        let indicator = TypingIndicator::start(Vec::new(), false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let written = tokio::time::timeout(Duration::from_secs(2), indicator.stop())
            .await
            .expect("indicator did not stop")
            .expect("indicator task failed");
        let written = String::from_utf8(written).unwrap();
        assert!(written.starts_with("\r>> LLM: .  "), "{:?}", written);
        assert!(written.ends_with(&clear_line()), "{:?}", written);
    }

    #[tokio::test]
    async fn typing_indicator_clears_even_when_stopped_at_once() {
        let written = TypingIndicator::start(Vec::new(), true).stop().await.unwrap();
        let written = String::from_utf8(written).unwrap();
        assert!(written.ends_with(&format!("\r{}\r", " ".repeat(40))));
        assert!(!written.contains(">> LLM:") || written.contains(CYAN));
    }

    #[test]
    fn indicator_frames_cycle() {
        let frames: Vec<String> = (0..5).map(|t| indicator_frame(t, false)).collect();
        assert_eq!(
            frames,
            vec![
                "\r>> LLM: .  ",
                "\r>> LLM: .. ",
                "\r>> LLM: ...",
                "\r>> LLM:    ",
                "\r>> LLM: .  ",
            ]
        );
        assert!(indicator_frame(0, true).contains(CYAN));
    }
}
