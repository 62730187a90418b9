//! Tests for the orchestration loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use team_agent::{
    AgentError, AgentState, Capability, CapabilitySpec, FnCapability, ParamSpec, ParamType,
    ScriptedBackend,
};

use super::*;

fn call(name: &str, args: Value) -> Invocation {
    Invocation::from_value(name, args)
}

fn calls(invocations: Vec<Invocation>) -> AgentResponse {
    AgentResponse::with_invocations("", invocations)
}

fn weather_tool(counter: Arc<AtomicUsize>) -> Arc<dyn Capability> {
    Arc::new(FnCapability::new(
        CapabilitySpec::new("get_weather", "Current temperature for a city")
            .param(ParamSpec::required("city", ParamType::Text)),
        move |inv: &Invocation| {
            let city = inv
                .get_string_arg("city")
                .map_err(|e| AgentError::arguments("get_weather", e))?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Temperature in {}: +18°C", city))
        },
    ))
}

fn install_tool(counter: Arc<AtomicUsize>) -> Arc<dyn Capability> {
    Arc::new(FnCapability::new(
        CapabilitySpec::new("install_package", "Install a package")
            .param(ParamSpec::required("package", ParamType::Text))
            .param(ParamSpec::optional("env_name", ParamType::Text, "python_env")),
        move |inv: &Invocation| {
            counter.fetch_add(1, Ordering::SeqCst);
            let package = inv.string_arg_or("package", "");
            if package.is_empty() || !package.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(AgentError::tool("install_package", "bad package name"));
            }
            Ok(format!("Successfully installed {}", package))
        },
    ))
}

struct Team {
    orchestrator: Orchestrator,
    coordinator: Arc<ScriptedBackend>,
    weather: Arc<ScriptedBackend>,
    search: Arc<ScriptedBackend>,
    weather_calls: Arc<AtomicUsize>,
    install_calls: Arc<AtomicUsize>,
}

fn team(config: OrchestratorConfig) -> Team {
    let coordinator = Arc::new(ScriptedBackend::new());
    let weather = Arc::new(ScriptedBackend::new());
    let search = Arc::new(ScriptedBackend::new());
    let weather_calls = Arc::new(AtomicUsize::new(0));
    let install_calls = Arc::new(AtomicUsize::new(0));

    let orchestrator_bot = Agent::coordinator("OrchestratorBot", "Route tasks.", coordinator.clone())
        .with_tool(weather_tool(weather_calls.clone()))
        .unwrap()
        .with_tool(install_tool(install_calls.clone()))
        .unwrap()
        .with_transfer("transfer_to_weather", "Weather questions", "WeatherBot")
        .unwrap()
        .with_transfer("transfer_to_search", "Web lookups", "SearchBot")
        .unwrap();

    let weather_bot = Agent::worker("WeatherBot", "Report the weather.", weather.clone())
        .with_tool(weather_tool(weather_calls.clone()))
        .unwrap()
        .with_transfer("transfer_to_orchestrator", "Hand back", "OrchestratorBot")
        .unwrap();

    let search_bot = Agent::worker("SearchBot", "Search the web.", search.clone())
        .with_transfer("transfer_to_orchestrator", "Hand back", "OrchestratorBot")
        .unwrap();

    let registry = AgentRegistry::new(vec![orchestrator_bot, weather_bot, search_bot]).unwrap();
    Team {
        orchestrator: Orchestrator::new(registry, config),
        coordinator,
        weather,
        search,
        weather_calls,
        install_calls,
    }
}

fn turn_report(outcome: TurnOutcome) -> TurnReport {
    match outcome {
        TurnOutcome::Report(report) => report,
        TurnOutcome::Exit => panic!("unexpected exit"),
    }
}

fn state(orchestrator: &Orchestrator, name: &str) -> AgentState {
    orchestrator.registry().get(name).unwrap().state()
}

#[tokio::test]
async fn test_weather_round_trip() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call(
        "transfer_to_weather",
        json!({"task": "weather in Paris"}),
    )]));
    t.coordinator.push(AgentResponse::text("It is +18°C in Paris."));
    t.weather.push(calls(vec![call("get_weather", json!({"city": "Paris"}))]));
    t.weather.push(calls(vec![call(
        "transfer_to_orchestrator",
        json!({"task": "reported Paris weather"}),
    )]));

    let report = turn_report(t.orchestrator.handle_input("weather in Paris").await.unwrap());

    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.active, "OrchestratorBot");
    assert_eq!(t.orchestrator.active(), "OrchestratorBot");
    assert_eq!(report.final_text(), Some("It is +18°C in Paris."));
    assert!(report.events.contains(&LoopEvent::Transfer {
        from: "OrchestratorBot".into(),
        to: "WeatherBot".into(),
        call: "transfer_to_weather(task=weather in Paris)".into(),
    }));
    assert!(report.events.contains(&LoopEvent::Returned {
        from: "WeatherBot".into(),
        to: "OrchestratorBot".into(),
        synthesized: false,
    }));

    // The worker was seeded with its task and instructions.
    let seed = t.weather.requests()[0].last_message().unwrap().to_string();
    assert!(seed.starts_with("weather in Paris\n\nReport the weather."));

    // The coordinator resumed from memory containing the result.
    let requests = t.coordinator.requests();
    assert_eq!(requests.len(), 2);
    let resume = requests[1].last_message().unwrap();
    assert!(resume.starts_with("The following is the conversation history so far:"));
    assert!(resume.contains("Temperature in Paris: +18°C"));

    assert!(t
        .orchestrator
        .memory()
        .scoped("WeatherBot")
        .any(|e| e.content.contains("Finished the Function Call: get_weather(city=Paris)")));
    assert_eq!(state(&t.orchestrator, "WeatherBot"), AgentState::Ready);
    assert_eq!(state(&t.orchestrator, "OrchestratorBot"), AgentState::Completed);
}

#[tokio::test]
async fn test_repeated_invocation_is_suppressed() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("get_weather", json!({"city": "Paris"}))]));
    t.coordinator.push(calls(vec![call("get_weather", json!({"city": "Paris"}))]));
    t.coordinator.push(AgentResponse::text("Done."));

    let report = turn_report(t.orchestrator.handle_input("weather in Paris").await.unwrap());

    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.executed(), 1);
    assert!(report.events.iter().any(|e| matches!(
        e,
        LoopEvent::CallSkipped { reason: SkipReason::AlreadyCompleted, .. }
    )));
    let feedback = t.coordinator.requests()[2].last_message().unwrap().to_string();
    assert!(feedback.contains("Already executed"));
}

#[tokio::test]
async fn test_error_context_forces_reexecution() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![
        call("get_weather", json!({"city": "Paris"})),
        call("install_package", json!({"package": "not a package!"})),
    ]));
    t.coordinator.push(calls(vec![call("get_weather", json!({"city": "Paris"}))]));
    t.coordinator.push(AgentResponse::text("Done."));

    turn_report(t.orchestrator.handle_input("weather, then install").await.unwrap());

    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 2);
    let coordinator = t.orchestrator.registry().get("OrchestratorBot").unwrap();
    assert_eq!(coordinator.completed().len(), 1);
    assert!(coordinator.error_context().unwrap().contains("bad package name"));
}

#[tokio::test]
async fn test_failing_capability_does_not_abort_batch() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![
        call("install_package", json!({"package": "???"})),
        call("get_weather", json!({"city": "Paris"})),
    ]));
    t.coordinator.push(AgentResponse::text("The install failed, but Paris is +18°C."));

    let report = turn_report(t.orchestrator.handle_input("install ??? and check Paris").await.unwrap());

    assert_eq!(t.install_calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 1);
    assert!(report.events.contains(&LoopEvent::CallFailed {
        agent: "OrchestratorBot".into(),
        call: "install_package(package=???)".into(),
        error: "bad package name".into(),
    }));
    assert!(t
        .orchestrator
        .memory()
        .entries()
        .iter()
        .any(|e| e.content == "Error executing install_package(package=???): bad package name"));

    let feedback = t.coordinator.requests()[1].last_message().unwrap().to_string();
    assert!(feedback.starts_with("The following functions have been executed:"));
    assert!(feedback.contains("Function install_package failed. Error: bad package name"));
    assert!(feedback.contains("Function get_weather finished."));

    // The session keeps going.
    t.coordinator.push(AgentResponse::text("Hello again."));
    let report = turn_report(t.orchestrator.handle_input("hi").await.unwrap());
    assert_eq!(report.final_text(), Some("Hello again."));
}

#[tokio::test]
async fn test_text_only_response_ends_turn() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(AgentResponse::text("Hello! How can I help?"));

    let report = turn_report(t.orchestrator.handle_input("hello").await.unwrap());

    assert_eq!(report.rounds, 1);
    assert_eq!(
        report.events,
        vec![LoopEvent::AssistantText {
            agent: "OrchestratorBot".into(),
            text: "Hello! How can I help?".into(),
        }]
    );
    assert_eq!(t.coordinator.request_count(), 1);
    assert_eq!(t.weather.request_count(), 0);

    let request = &t.coordinator.requests()[0];
    assert_eq!(request.last_message(), Some("hello\n\nRoute tasks."));
}

#[tokio::test]
async fn test_exit_sentinel_makes_no_backend_calls() {
    let mut t = team(OrchestratorConfig::default());
    for input in ["exit", "EXIT", "  Exit  "] {
        assert!(matches!(
            t.orchestrator.handle_input(input).await.unwrap(),
            TurnOutcome::Exit
        ));
    }
    assert_eq!(t.coordinator.request_count(), 0);
    assert!(t.orchestrator.memory().is_empty());
    assert!(!is_exit("exit now"));
}

#[tokio::test]
async fn test_empty_input_is_ignored() {
    let mut t = team(OrchestratorConfig::default());
    let report = turn_report(t.orchestrator.handle_input("   ").await.unwrap());
    assert!(report.events.is_empty());
    assert_eq!(t.coordinator.request_count(), 0);
}

#[tokio::test]
async fn test_completed_worker_auto_returns() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("transfer_to_search", json!({"task": "find rust news"}))]));
    t.coordinator.push(AgentResponse::text("Here is the news."));
    t.search.push(AgentResponse::text("Rust 1.80 was released."));

    let report = turn_report(t.orchestrator.handle_input("rust news?").await.unwrap());

    assert!(report.events.contains(&LoopEvent::Returned {
        from: "SearchBot".into(),
        to: "OrchestratorBot".into(),
        synthesized: true,
    }));
    assert_eq!(report.active, "OrchestratorBot");
    assert_eq!(state(&t.orchestrator, "SearchBot"), AgentState::Ready);
    assert_eq!(report.final_text(), Some("Here is the news."));
}

#[tokio::test]
async fn test_wait_for_transfer_keeps_worker_active() {
    let config = OrchestratorConfig::default().with_return_policy(ReturnPolicy::WaitForTransfer);
    let mut t = team(config);
    t.coordinator.push(calls(vec![call("transfer_to_search", json!({"task": "find rust news"}))]));
    t.search.push(AgentResponse::text("Which topic exactly?"));

    let report = turn_report(t.orchestrator.handle_input("rust news?").await.unwrap());
    assert_eq!(report.active, "SearchBot");
    assert_eq!(state(&t.orchestrator, "SearchBot"), AgentState::Completed);
    assert_eq!(t.coordinator.request_count(), 1);

    // The next input goes straight to the worker, which then hands back.
    t.search.push(calls(vec![call("transfer_to_orchestrator", json!({"task": "done"}))]));
    t.coordinator.push(AgentResponse::text("All done."));
    let report = turn_report(t.orchestrator.handle_input("compilers").await.unwrap());

    assert!(t.search.requests()[1]
        .last_message()
        .unwrap()
        .starts_with("compilers\n\nSearch the web."));
    assert_eq!(report.active, "OrchestratorBot");
    assert_eq!(report.final_text(), Some("All done."));
}

#[tokio::test]
async fn test_transfer_has_no_side_effects() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("transfer_to_weather", json!({"task": "x"}))]));

    let report = turn_report(t.orchestrator.handle_input("weather?").await.unwrap());

    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 0);
    assert_eq!(t.install_calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.executed(), 0);
    assert_eq!(t.weather.request_count(), 1);
    let coordinator = t.orchestrator.registry().get("OrchestratorBot").unwrap();
    assert!(coordinator.completed().is_empty());
}

#[tokio::test]
async fn test_round_trip_preserves_completed_set() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("get_weather", json!({"city": "Paris"}))]));
    t.coordinator.push(calls(vec![call("transfer_to_weather", json!({"task": "Rome too"}))]));
    t.coordinator.push(AgentResponse::text("Paris and Rome are warm."));
    t.weather.push(calls(vec![call("get_weather", json!({"city": "Rome"}))]));
    t.weather.push(AgentResponse::text("Rome is +18°C."));

    turn_report(t.orchestrator.handle_input("Paris and Rome").await.unwrap());

    let coordinator = t.orchestrator.registry().get("OrchestratorBot").unwrap();
    assert_eq!(coordinator.completed().len(), 1);
    assert!(coordinator.is_completed(&call("get_weather", json!({"city": "Paris"}))));
    let weather = t.orchestrator.registry().get("WeatherBot").unwrap();
    assert_eq!(weather.completed().len(), 1);
    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 2);

    // Prior work is still known on the next task.
    t.coordinator.push(calls(vec![call("get_weather", json!({"city": "Paris"}))]));
    t.coordinator.push(AgentResponse::text("Still +18°C."));
    turn_report(t.orchestrator.handle_input("Paris again?").await.unwrap());
    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 2);

    let system = &t.coordinator.requests()[3].system;
    assert!(system.contains("Previously executed function calls:\n- get_weather(city=Paris)"));
}

#[tokio::test]
async fn test_return_ends_worker_batch_early() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("transfer_to_weather", json!({"task": "weather"}))]));
    t.coordinator.push(AgentResponse::text("Done."));
    t.weather.push(calls(vec![
        call("get_weather", json!({"city": "Paris"})),
        call("transfer_to_orchestrator", json!({"task": "done"})),
        call("get_weather", json!({"city": "Rome"})),
    ]));

    let report = turn_report(t.orchestrator.handle_input("weather").await.unwrap());

    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.active, "OrchestratorBot");
    assert!(!report.events.iter().any(|e| matches!(
        e,
        LoopEvent::CallStarted { call, .. } if call.contains("Rome")
    )));
}

#[tokio::test]
async fn test_deferred_coordinator_transfers() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![
        call("transfer_to_weather", json!({"task": "weather in Paris"})),
        call("transfer_to_search", json!({"task": "news about Paris"})),
    ]));
    t.coordinator.push(AgentResponse::text("Weather and news delivered."));
    t.weather.push(AgentResponse::text("Paris is +18°C."));
    t.search.push(AgentResponse::text("Paris hosts a marathon."));

    let report = turn_report(t.orchestrator.handle_input("Paris weather and news").await.unwrap());

    let hops: Vec<(String, String)> = report
        .events
        .iter()
        .filter_map(|e| match e {
            LoopEvent::Transfer { from, to, .. } | LoopEvent::Returned { from, to, .. } => {
                Some((from.clone(), to.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        hops,
        vec![
            ("OrchestratorBot".to_string(), "WeatherBot".to_string()),
            ("WeatherBot".to_string(), "OrchestratorBot".to_string()),
            ("OrchestratorBot".to_string(), "SearchBot".to_string()),
            ("SearchBot".to_string(), "OrchestratorBot".to_string()),
        ]
    );
    assert_eq!(t.coordinator.request_count(), 2);
    assert_eq!(report.final_text(), Some("Weather and news delivered."));
}

#[tokio::test]
async fn test_unknown_capability_is_skipped() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("transfer_to_code", json!({"task": "x"}))]));
    t.coordinator.push(AgentResponse::text("I can't do that."));

    let report = turn_report(t.orchestrator.handle_input("write code").await.unwrap());

    assert!(report.events.iter().any(|e| matches!(
        e,
        LoopEvent::CallSkipped { reason: SkipReason::UnknownCapability, .. }
    )));
    assert_eq!(report.active, "OrchestratorBot");
    let feedback = t.coordinator.requests()[1].last_message().unwrap().to_string();
    assert!(feedback.contains("Unknown function: transfer_to_code"));
}

#[tokio::test]
async fn test_backend_failure_is_recovered() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push_error("HTTP request failed: connection refused");

    let report = turn_report(t.orchestrator.handle_input("hello").await.unwrap());

    assert!(matches!(
        report.events.as_slice(),
        [LoopEvent::BackendFailure { error, .. }] if error.contains("connection refused")
    ));
    assert_eq!(report.active, "OrchestratorBot");
}

#[tokio::test]
async fn test_round_limit() {
    let mut t = team(OrchestratorConfig::default().with_max_rounds(2));
    for city in ["Paris", "Rome", "Oslo", "Lima"] {
        t.coordinator.push(calls(vec![call("get_weather", json!({"city": city}))]));
    }

    let report = turn_report(t.orchestrator.handle_input("tour").await.unwrap());

    assert_eq!(t.weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        report.events.last(),
        Some(&LoopEvent::RoundLimit {
            agent: "OrchestratorBot".into(),
            rounds: 2,
        })
    );
}

#[tokio::test]
async fn test_round_limit_still_returns_finished_worker() {
    let mut t = team(OrchestratorConfig::default().with_max_rounds(2));
    t.coordinator.push(calls(vec![call("transfer_to_search", json!({"task": "rust news"}))]));
    t.search.push(AgentResponse::text("Rust 2024 edition is out."));

    let report = turn_report(t.orchestrator.handle_input("rust news?").await.unwrap());

    assert_eq!(report.active, "OrchestratorBot");
    assert_eq!(t.orchestrator.active(), "OrchestratorBot");
    assert_eq!(state(&t.orchestrator, "SearchBot"), AgentState::Ready);
    assert!(report.events.contains(&LoopEvent::Returned {
        from: "SearchBot".into(),
        to: "OrchestratorBot".into(),
        synthesized: true,
    }));
    assert_eq!(
        report.events.last(),
        Some(&LoopEvent::RoundLimit {
            agent: "OrchestratorBot".into(),
            rounds: 2,
        })
    );
    // The limit only skips the coordinator's resume request.
    assert_eq!(t.coordinator.request_count(), 1);

    // The next input reaches the coordinator, not the finished worker.
    t.coordinator.push(AgentResponse::text("Anything else?"));
    let next = turn_report(t.orchestrator.handle_input("thanks").await.unwrap());
    assert_eq!(next.final_text(), Some("Anything else?"));
    assert_eq!(t.search.request_count(), 1);
}

#[tokio::test]
async fn test_transfer_note_is_in_target_scope() {
    let config = OrchestratorConfig::default().with_return_policy(ReturnPolicy::WaitForTransfer);
    let mut t = team(config);
    t.coordinator.push(calls(vec![call("transfer_to_search", json!({"task": "first"}))]));
    t.search.push(AgentResponse::text("ok"));

    turn_report(t.orchestrator.handle_input("look this up").await.unwrap());

    let note = t
        .orchestrator
        .memory()
        .scoped("SearchBot")
        .find(|e| e.kind == MemoryKind::Transfer)
        .map(|e| e.content.clone());
    assert_eq!(
        note.as_deref(),
        Some("OrchestratorBot is Transferring Function Call: transfer_to_search(task=first) -> SearchBot")
    );
    let seed = t.search.requests()[0].last_message().unwrap().to_string();
    assert!(seed.contains("Your earlier activity in this session:\nOrchestratorBot is Transferring"));
}

#[tokio::test]
async fn test_transfer_without_task_uses_raw_input() {
    let mut t = team(OrchestratorConfig::default());
    t.coordinator.push(calls(vec![call("transfer_to_search", json!({}))]));
    t.search.push(calls(vec![call("transfer_to_orchestrator", json!({"task": "done"}))]));
    t.coordinator.push(AgentResponse::text("Done."));

    turn_report(t.orchestrator.handle_input("latest rust release").await.unwrap());

    let seed = t.search.requests()[0].last_message().unwrap().to_string();
    assert!(seed.starts_with("latest rust release\n\nSearch the web."));
    assert!(!seed.starts_with("User: "));
}

#[tokio::test]
async fn test_fresh_input_carries_memory_snapshot() {
    let mut t = team(OrchestratorConfig::default().with_memory_window(1));
    t.coordinator.push(AgentResponse::text("First answer."));
    t.coordinator.push(AgentResponse::text("Second answer."));

    turn_report(t.orchestrator.handle_input("first").await.unwrap());
    turn_report(t.orchestrator.handle_input("second").await.unwrap());

    let request = t.coordinator.requests()[1].last_message().unwrap().to_string();
    assert_eq!(
        request,
        "second\n\nRoute tasks.\n\nConversation history:\nOrchestratorBot: First answer."
    );
}

#[tokio::test]
async fn test_reset() {
    let config = OrchestratorConfig::default().with_return_policy(ReturnPolicy::WaitForTransfer);
    let mut t = team(config);
    t.coordinator.push(calls(vec![call("transfer_to_search", json!({"task": "x"}))]));
    t.search.push(AgentResponse::text("ok"));
    turn_report(t.orchestrator.handle_input("search").await.unwrap());
    assert_eq!(t.orchestrator.active(), "SearchBot");

    t.orchestrator.reset();

    assert_eq!(t.orchestrator.active(), "OrchestratorBot");
    assert!(t.orchestrator.memory().is_empty());
    assert!(t
        .orchestrator
        .registry()
        .iter()
        .all(|a| a.state() == AgentState::Ready && a.history().is_empty()));
}
