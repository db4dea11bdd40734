//! `vocalis agent` — Interactive or single-utterance mode.
//!
//! Each line is one utterance. `remember …` and `forget …` map to the memory
//! intents, `my name is …` introduces the user, `yes`/`no` answer a pending
//! reminder offer, `/clear` and `/history` manage the session; anything else
//! is conversation. Any other utterance while a reminder offer is pending
//! drops the offer.
//!
//! Session attributes are kept in `~/.vocalis/sessions/<session>.json` so a
//! reminder offered by one invocation can be confirmed by the next, the way
//! a voice platform round-trips them between requests.

use chrono_tz::Tz;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use vocalis_core::Error;
use vocalis_core::session::SessionAttributes;
use vocalis_engine::{Orchestrator, RequestContext};
use vocalis_reminders::ConfirmationState;

use super::session::{load_attributes, save_attributes, sessions_dir};
use super::{build_orchestrator, load_config};
use crate::SessionArgs;

const PROCESSING_ERROR: &str = "My systems are experiencing a temporary issue. Please try again.";
const CLEARED: &str = "Our conversation history has been cleared.";
const UNKNOWN_USER: &str =
    "I don't believe we've met. Please introduce yourself first, for example \"my name is Ada\".";

/// What a line of input asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent<'a> {
    Converse(&'a str),
    Remember(&'a str),
    Forget(&'a str),
    Introduce(&'a str),
    Yes,
    No,
    Clear,
    History,
    Exit,
    Empty,
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| line[prefix.len()..].trim())
}

impl<'a> Intent<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let bare = line.trim_end_matches(['.', '!', '?']).to_lowercase();
        match bare.as_str() {
            "exit" | "quit" | "/exit" | "/quit" => return Self::Exit,
            "/clear" => return Self::Clear,
            "/history" => return Self::History,
            "yes" | "yeah" | "yep" | "sure" | "ok" | "okay" | "yes please" => return Self::Yes,
            "no" | "nope" | "no thanks" | "no thank you" => return Self::No,
            _ => {}
        }

        for prefix in ["remember that ", "remember "] {
            if let Some(rest) = strip_prefix_ci(line, prefix) {
                return Self::Remember(rest);
            }
        }
        if let Some(rest) = strip_prefix_ci(line, "forget ") {
            return Self::Forget(rest);
        }
        for prefix in ["my name is ", "call me "] {
            if let Some(rest) = strip_prefix_ci(line, prefix) {
                return Self::Introduce(rest.trim_end_matches(['.', '!']).trim());
            }
        }
        Self::Converse(line)
    }

    /// Utterances that leave a pending reminder offer open.
    fn keeps_offer(&self) -> bool {
        matches!(self, Self::Yes | Self::No | Self::History | Self::Exit | Self::Empty)
    }
}

fn failure_speech(e: &Error) -> String {
    match e {
        Error::Reminder(reminder) => reminder.user_message(),
        other => {
            error!(error = %other, "Turn failed");
            PROCESSING_ERROR.to_string()
        }
    }
}

/// Answer one utterance.
pub async fn respond(
    orchestrator: &Orchestrator,
    ctx: &RequestContext,
    attrs: &mut SessionAttributes,
    intent: Intent<'_>,
) -> String {
    let mut awaiting = orchestrator.reminder_state(attrs) == ConfirmationState::AwaitingConfirmation;
    if awaiting && !intent.keeps_offer() {
        orchestrator.abandon_reminder(attrs);
        awaiting = false;
    }

    if matches!(intent, Intent::Converse(_) | Intent::Forget(_)) && !knows_user(orchestrator, ctx).await {
        info!(user = %ctx.user_id, "Unknown user, asking for an introduction");
        return UNKNOWN_USER.to_string();
    }

    match intent {
        Intent::Yes if awaiting => match orchestrator.confirm_reminder(ctx, attrs).await {
            Ok(outcome) => outcome.speech().to_string(),
            Err(e) => {
                warn!(error = %e, "Reminder not created");
                e.user_message()
            }
        },
        Intent::No if awaiting => orchestrator.decline_reminder(attrs),
        Intent::Remember(memory) => match orchestrator.remember(ctx, attrs, memory).await {
            Ok(outcome) => outcome.speech().to_string(),
            Err(e) => failure_speech(&e),
        },
        Intent::Forget(memory) => match orchestrator.forget(ctx, memory).await {
            Ok(outcome) => outcome.speech().to_string(),
            Err(e) => failure_speech(&e),
        },
        Intent::Introduce(name) => match orchestrator.introduce(ctx, name).await {
            Ok(outcome) => outcome.speech().to_string(),
            Err(e) => failure_speech(&e),
        },
        Intent::Clear => match orchestrator.clear_session(&ctx.session_id).await {
            Ok(()) => {
                *attrs = SessionAttributes::new();
                CLEARED.to_string()
            }
            Err(e) => failure_speech(&e),
        },
        Intent::Yes => converse(orchestrator, ctx, "yes").await,
        Intent::No => converse(orchestrator, ctx, "no").await,
        Intent::Converse(query) => converse(orchestrator, ctx, query).await,
        Intent::History | Intent::Exit | Intent::Empty => String::new(),
    }
}

async fn knows_user(orchestrator: &Orchestrator, ctx: &RequestContext) -> bool {
    ctx.user_name.as_deref().is_some_and(|n| !n.trim().is_empty())
        || orchestrator.user_name(&ctx.user_id).await.is_some()
}

async fn converse(orchestrator: &Orchestrator, ctx: &RequestContext, query: &str) -> String {
    match orchestrator.converse(ctx, query).await {
        Ok(reply) => reply,
        Err(e) => failure_speech(&e),
    }
}

fn request_context(args: &SessionArgs, tz: Tz) -> RequestContext {
    let ctx = RequestContext::new(args.session.clone(), args.user.clone(), tz);
    match &args.name {
        Some(name) => ctx.with_user_name(name.clone()),
        None => ctx,
    }
}

async fn print_history(orchestrator: &Orchestrator, session: &str) {
    match orchestrator.history(session).await {
        Ok(messages) if messages.is_empty() => println!("  (no messages yet)"),
        Ok(messages) => {
            for message in messages {
                println!("  [{}] {}", message.role, message.content);
            }
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}

pub async fn run(message: Option<String>, args: SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let tz_name = args
        .tz
        .clone()
        .unwrap_or_else(|| config.reminders.default_time_zone.clone());
    let tz: Tz = tz_name
        .parse()
        .map_err(|e| format!("Invalid time zone \"{tz_name}\": {e}"))?;

    let orchestrator = build_orchestrator(&config)?;
    let dir = sessions_dir();
    let mut attrs = load_attributes(&dir, &args.session);

    if let Some(msg) = message {
        // Single utterance mode
        let ctx = request_context(&args, tz);
        let intent = Intent::parse(&msg);
        if intent == Intent::History {
            print_history(&orchestrator, &args.session).await;
        } else {
            let reply = respond(&orchestrator, &ctx, &mut attrs, intent).await;
            println!("{reply}");
        }
        save_attributes(&dir, &args.session, &attrs);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Vocalis — Interactive Mode");
    println!();
    println!("  Model:     {}", config.model.model);
    println!("  Memory:    {} ({})", config.memory.backend, config.memory.server_url);
    println!("  Session:   {} (user {}, {})", args.session, args.user, tz.name());
    println!("  Reminders: {}", config.reminders.api_url.as_deref().unwrap_or("dry-run"));
    println!();
    println!("  Say \"my name is …\" to introduce yourself,");
    println!("  and \"remember …\" or \"forget …\" to manage memories.");
    println!("  /history shows the chat window, /clear resets it, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let intent = Intent::parse(&line);
        debug!(?intent, "Parsed utterance");

        match intent {
            Intent::Exit => break,
            Intent::Empty => {}
            Intent::History => print_history(&orchestrator, &args.session).await,
            intent => {
                let ctx = request_context(&args, tz);
                eprint!("  ...");
                let reply = respond(&orchestrator, &ctx, &mut attrs, intent).await;
                eprint!("\r     \r");
                println!();
                for line in reply.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
                save_attributes(&dir, &args.session, &attrs);
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};
    use vocalis_config::{AppConfig, FallbackPolicy};
    use vocalis_core::error::ProviderError;
    use vocalis_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use vocalis_engine::QueryClassifier;
    use vocalis_memory::InMemoryBackend;
    use vocalis_reminders::InMemoryReminderApi;

    struct Scripted {
        replies: Mutex<Vec<&'static str>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            let content = self.replies.lock().unwrap().remove(0).to_string();
            Ok(ProviderResponse {
                content,
                model: request.model,
                usage: None,
                tool_calls: Vec::new(),
            })
        }
    }

    struct NoSources;

    #[async_trait]
    impl QueryClassifier for NoSources {
        fn name(&self) -> &str {
            "none"
        }

        async fn classify(&self, _query: &str, _descriptions: &[&str]) -> vocalis_core::Result<Vec<usize>> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        provider: Arc<Scripted>,
        reminders: Arc<InMemoryReminderApi>,
    }

    fn harness(replies: Vec<&'static str>) -> Harness {
        let provider = Arc::new(Scripted {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        });
        let reminders = Arc::new(InMemoryReminderApi::new());
        let mut config = AppConfig::default();
        config.retrieval.fallback = FallbackPolicy::RouteToNone;
        let orchestrator = Orchestrator::new(
            &config,
            provider.clone(),
            Arc::new(InMemoryBackend::new()),
            reminders.clone(),
        )
        .with_classifier(Arc::new(NoSources));
        Harness {
            orchestrator,
            provider,
            reminders,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("s1", "u1", chrono_tz::America::New_York)
            .at(Utc.with_ymd_and_hms(2026, 1, 5, 15, 0, 0).unwrap())
    }

    const DENTIST: &str = r#"{"answer":"Noted.","suggest_reminder":true,"reminder_topic":"Dentist",
        "schedule":"2026-01-06T14:00:00","is_recurring":false}"#;

    #[tokio::test]
    async fn changing_topic_drops_the_reminder_offer() {
        let h = harness(vec![DENTIST, "It looks sunny today.", "Glad to hear it."]);
        let ctx = ctx().with_user_name("Ada");
        let mut attrs = SessionAttributes::new();

        let offer = respond(&h.orchestrator, &ctx, &mut attrs, Intent::parse("remember dentist tomorrow at 2")).await;
        assert!(offer.ends_with("Would you like me to set up a reminder for this?"));
        assert_eq!(h.orchestrator.reminder_state(&attrs), ConfirmationState::AwaitingConfirmation);

        respond(&h.orchestrator, &ctx, &mut attrs, Intent::parse("what's the weather like?")).await;
        assert!(attrs.is_empty());

        let reply = respond(&h.orchestrator, &ctx, &mut attrs, Intent::parse("yes")).await;
        assert_eq!(reply, "Glad to hear it.");
        assert!(h.reminders.recorded().is_empty());
        assert_eq!(h.provider.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn answering_the_offer_still_works() {
        let h = harness(vec![DENTIST]);
        let ctx = ctx().with_user_name("Ada");
        let mut attrs = SessionAttributes::new();

        respond(&h.orchestrator, &ctx, &mut attrs, Intent::parse("remember dentist tomorrow at 2")).await;
        respond(&h.orchestrator, &ctx, &mut attrs, Intent::Empty).await;
        respond(&h.orchestrator, &ctx, &mut attrs, Intent::parse("yes please")).await;
        assert_eq!(h.reminders.recorded().len(), 1);
        assert!(attrs.is_empty());
    }

    #[tokio::test]
    async fn strangers_are_asked_to_introduce_themselves() {
        let h = harness(vec!["Pleasure to meet you, Grace.", "Hello, Grace."]);
        let mut attrs = SessionAttributes::new();

        let reply = respond(&h.orchestrator, &ctx(), &mut attrs, Intent::parse("hello")).await;
        assert_eq!(reply, UNKNOWN_USER);
        assert!(h.provider.requests.lock().unwrap().is_empty());

        let reply = respond(&h.orchestrator, &ctx(), &mut attrs, Intent::parse("My name is Grace.")).await;
        assert_eq!(reply, "Pleasure to meet you, Grace.");

        let reply = respond(&h.orchestrator, &ctx(), &mut attrs, Intent::parse("hello")).await;
        assert_eq!(reply, "Hello, Grace.");
        let requests = h.provider.requests.lock().unwrap();
        assert!(requests[1].system.as_deref().unwrap().contains("The name of the user is Grace."));
    }

    #[test]
    fn introductions() {
        assert_eq!(Intent::parse("My name is Grace Hopper."), Intent::Introduce("Grace Hopper"));
        assert_eq!(Intent::parse("call me Ada!"), Intent::Introduce("Ada"));
        assert_eq!(Intent::parse("my name is"), Intent::Converse("my name is"));
    }

    #[test]
    fn memory_intents() {
        assert_eq!(
            Intent::parse("Remember that my locker code is 1234"),
            Intent::Remember("my locker code is 1234")
        );
        assert_eq!(Intent::parse("remember dentist at 2"), Intent::Remember("dentist at 2"));
        assert_eq!(Intent::parse("FORGET my locker code"), Intent::Forget("my locker code"));
    }

    #[test]
    fn confirmation_words() {
        assert_eq!(Intent::parse("Yes!"), Intent::Yes);
        assert_eq!(Intent::parse("  sure "), Intent::Yes);
        assert_eq!(Intent::parse("No thanks."), Intent::No);
    }

    #[test]
    fn commands_and_conversation() {
        assert_eq!(Intent::parse("/clear"), Intent::Clear);
        assert_eq!(Intent::parse("quit"), Intent::Exit);
        assert_eq!(Intent::parse("   "), Intent::Empty);
        assert_eq!(
            Intent::parse("what do you remember about me?"),
            Intent::Converse("what do you remember about me?")
        );
        assert_eq!(Intent::parse("remembering is hard"), Intent::Converse("remembering is hard"));
    }

    #[test]
    fn prefix_match_respects_char_boundaries() {
        assert_eq!(Intent::parse("rémember x"), Intent::Converse("rémember x"));
    }
}
