//! End-to-end runs through the nutrition agent graph with a scripted model.

mod common;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use common::{calorie_store, StaticSearchServer};
use nutrition_agents::handoff::transfer_tool_name;
use nutrition_agents::items::{ModelResponse, ToolCall};
use nutrition_agents::knowledge::CalorieLookupTool;
use nutrition_agents::{
    AgentPrompts, InMemorySession, MockProvider, NutritionAgents, RunConfig, RunEvent, Runner,
    Session, ToolServer,
};

const GUARDRAIL: &str = "Guardrail check";
const NUTRITION: &str = "Nutrition Assistant";
const ADVISOR: &str = "Breakfast Advisor";
const PLANNER: &str = "Breakfast Planner Assistant";
const PRICE_CHECKER: &str = "Breakfast Price Checker Assistant";

const OFF_TOPIC: &str = r#"{"only_about_food": false}"#;
const ON_TOPIC: &str = r#"{"only_about_food": true}"#;

async fn build_agents(search: Arc<StaticSearchServer>) -> NutritionAgents {
    let prompts = AgentPrompts::embedded().unwrap();
    let lookup = Arc::new(CalorieLookupTool::new(Arc::new(calorie_store().await)));
    NutritionAgents::build(&prompts, lookup, Some(search as Arc<dyn ToolServer>))
}

fn tool_names(calls: &[&nutrition_agents::items::ToolCallItem]) -> Vec<String> {
    calls.iter().map(|c| c.tool_name.clone()).collect()
}

#[tokio::test]
async fn test_off_topic_input_never_reaches_the_nutrition_agent() {
    let search = StaticSearchServer::new("unused");
    let agents = build_agents(search.clone()).await;
    let provider = Arc::new(
        MockProvider::new("test-model")
            .with_agent_message(GUARDRAIL, OFF_TOPIC)
            .with_agent_tool_call(NUTRITION, "calorie_lookup_tool", json!({"query": "x"})),
    );
    let session = Arc::new(InMemorySession::new("user-1"));
    let config = RunConfig::new(provider.clone()).with_session(session.clone());

    let outcome = Runner::run(agents.nutrition_agent(), "What is the capital of France?", config)
        .await
        .unwrap();

    let trip = outcome.trip().expect("guardrail should trip");
    assert_eq!(trip.guardrail, "food_topic_guardrail");
    assert_eq!(trip.agent, NUTRITION);
    assert_eq!(trip.output_info, Some(json!({"only_about_food": false})));

    // Only the classifier was consulted; no tools were listed or called.
    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].agent, GUARDRAIL);
    assert!(requests[0].output_schema.is_some());
    assert_eq!(
        requests[0].last_user_message(),
        Some("What is the capital of France?")
    );
    assert_eq!(search.listing_count(), 0);
    assert!(session.get_items(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_food_question_passes_the_gate_and_uses_the_lookup() {
    let search = StaticSearchServer::new("unused");
    let agents = build_agents(search).await;
    let provider = Arc::new(
        MockProvider::new("test-model")
            .with_agent_message(GUARDRAIL, ON_TOPIC)
            .with_agent_tool_call(
                NUTRITION,
                "calorie_lookup_tool",
                json!({"query": "chicken breast", "max_results": 1}),
            )
            .with_agent_message(NUTRITION, "Chicken breast has 165 calories per 100g."),
    );

    let result = Runner::run(
        agents.nutrition_agent(),
        "How many calories are in 100g of chicken breast?",
        RunConfig::new(provider.clone()),
    )
    .await
    .unwrap()
    .into_result()
    .unwrap();

    assert_eq!(result.final_output, "Chicken breast has 165 calories per 100g.");
    assert!(result.tool_call_count() >= 1);
    assert_eq!(result.last_agent, NUTRITION);

    let nutrition_requests = provider.requests_for(NUTRITION);
    assert_eq!(nutrition_requests.len(), 2);
    let offered: Vec<&str> = nutrition_requests[0]
        .tools
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(offered, vec!["calorie_lookup_tool", "web_search_exa"]);
    assert_eq!(
        nutrition_requests[1].messages.last().unwrap().content,
        "Nutrition Information:\nChicken Breast (Poultry): 165 calories per 100g"
    );
}

#[tokio::test]
async fn test_guarded_advisor_trip_makes_no_tool_calls_or_handoffs() {
    let search = StaticSearchServer::new("unused");
    let agents = build_agents(search.clone()).await;
    let provider = Arc::new(
        MockProvider::new("test-model")
            .with_agent_message(GUARDRAIL, OFF_TOPIC)
            .with_agent_tool_call(ADVISOR, &transfer_tool_name(PRICE_CHECKER), json!({})),
    );

    let outcome = Runner::run(
        agents.breakfast_advisor_guarded.clone(),
        "Write me a poem about the sea",
        RunConfig::new(provider.clone()),
    )
    .await
    .unwrap();

    assert!(outcome.is_guardrail_tripped());
    assert!(provider.requests_for(ADVISOR).is_empty());
    assert!(provider.requests_for(PRICE_CHECKER).is_empty());
    assert_eq!(search.listing_count(), 0);
}

fn script_breakfast_run(provider: MockProvider) -> MockProvider {
    provider
        .with_agent_tool_call(
            ADVISOR,
            "breakfast-planner",
            json!({"input": "High protein breakfast, no dairy"}),
        )
        .with_agent_tool_call(
            ADVISOR,
            "calorie-calculator",
            json!({"input": "Calories in 2 eggs and 100g rice"}),
        )
        .with_agent_tool_call(
            ADVISOR,
            &transfer_tool_name(PRICE_CHECKER),
            json!({"reason": "check ingredient prices"}),
        )
        .with_agent_message(PLANNER, "1. Egg fried rice\n2. Rice porridge with egg")
        .with_agent_tool_call(
            NUTRITION,
            "calorie_lookup_tool",
            json!({"query": "egg", "max_results": 1}),
        )
        .with_agent_message(NUTRITION, "Egg: 155 calories per 100g.")
        .with_agent_tool_call(PRICE_CHECKER, "web_search_exa", json!({"query": "egg price"}))
        .with_agent_message(PRICE_CHECKER, "| Meal | Price |\n| Egg fried rice | 2.10 EUR |")
}

#[tokio::test]
async fn test_advisor_plans_computes_and_hands_off_to_price_checker() {
    let search = StaticSearchServer::new("Eggs cost 0.30 EUR each");
    let agents = build_agents(search).await;
    let provider = Arc::new(script_breakfast_run(MockProvider::new("test-model")));

    let result = Runner::run(
        agents.breakfast_advisor.clone(),
        "I want a high protein breakfast without dairy",
        RunConfig::new(provider.clone()),
    )
    .await
    .unwrap()
    .into_result()
    .unwrap();

    assert_eq!(
        result.final_output,
        "| Meal | Price |\n| Egg fried rice | 2.10 EUR |"
    );
    assert_eq!(result.last_agent, PRICE_CHECKER);
    assert_eq!(result.handoff_count(), 1);
    assert_eq!(result.handoffs()[0].from_agent, ADVISOR);
    assert_eq!(result.handoffs()[0].reason.as_deref(), Some("check ingredient prices"));

    // Nested agent runs stay out of the outer trace.
    assert_eq!(
        tool_names(&result.tool_calls()),
        vec![
            "breakfast-planner".to_string(),
            "calorie-calculator".to_string(),
            transfer_tool_name(PRICE_CHECKER),
            "web_search_exa".to_string(),
        ]
    );

    // The advisor is not consulted again after handing off.
    assert_eq!(provider.requests_for(ADVISOR).len(), 3);

    // The wrapped agents start from their own instructions and the tool input only.
    let nutrition = provider.requests_for(NUTRITION);
    assert_eq!(nutrition[0].messages.len(), 2);
    assert_eq!(
        nutrition[0].last_user_message(),
        Some("Calories in 2 eggs and 100g rice")
    );
    let planner = provider.requests_for(PLANNER);
    assert_eq!(planner.len(), 1);
    assert!(planner[0].tools.is_empty());

    // The advisor sees only the final text of each wrapped agent.
    let advisor = provider.requests_for(ADVISOR);
    let planner_output = advisor[1].messages.last().unwrap();
    assert_eq!(planner_output.content, "1. Egg fried rice\n2. Rice porridge with egg");
    let calculator_output = advisor[2].messages.last().unwrap();
    assert_eq!(calculator_output.content, "Egg: 155 calories per 100g.");

    // After the handoff the price checker runs under its own instructions
    // with the search tool.
    let price = provider.requests_for(PRICE_CHECKER);
    assert!(price[0]
        .system_prompt()
        .unwrap()
        .contains("checks for the price of the ingredients"));
    assert_eq!(price[0].tools[0].name, "web_search_exa");
    assert_eq!(
        price[1].messages.last().unwrap().content,
        "Eggs cost 0.30 EUR each"
    );
}

#[tokio::test]
async fn test_handoff_drops_other_calls_in_the_same_response() {
    let search = StaticSearchServer::new("unused");
    let agents = build_agents(search).await;
    let provider = Arc::new(
        MockProvider::new("test-model")
            .for_agent(
                ADVISOR,
                ModelResponse::new_tool_calls(vec![
                    ToolCall::new("breakfast-planner", json!({"input": "anything"})),
                    ToolCall::new(transfer_tool_name(PRICE_CHECKER), json!({})),
                ]),
            )
            .with_agent_message(PRICE_CHECKER, "Prices unavailable."),
    );

    let result = Runner::run(
        agents.breakfast_advisor.clone(),
        "Plan my breakfast",
        RunConfig::new(provider.clone()),
    )
    .await
    .unwrap()
    .into_result()
    .unwrap();

    assert_eq!(result.final_output, "Prices unavailable.");
    assert_eq!(result.last_agent, PRICE_CHECKER);
    assert!(provider.requests_for(PLANNER).is_empty());
    assert_eq!(
        tool_names(&result.tool_calls()),
        vec![transfer_tool_name(PRICE_CHECKER)]
    );
}

fn event_agent_tools(events: &[RunEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::ToolCallStarted {
                agent, tool_name, ..
            } => Some((agent.clone(), tool_name.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_streamed_advisor_run_reports_only_outer_events() {
    let search = StaticSearchServer::new("Eggs cost 0.30 EUR each");
    let agents = build_agents(search).await;
    let provider = Arc::new(script_breakfast_run(MockProvider::new("test-model")));

    let stream = Runner::run_stream(
        agents.breakfast_advisor.clone(),
        "I want a high protein breakfast without dairy",
        RunConfig::new(provider),
    )
    .await
    .unwrap();
    let events: Vec<RunEvent> = stream.collect().await;

    let started: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::AgentStarted { agent } => Some(agent.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![ADVISOR.to_string(), PRICE_CHECKER.to_string()]);

    assert_eq!(
        event_agent_tools(&events),
        vec![
            (ADVISOR.to_string(), "breakfast-planner".to_string()),
            (ADVISOR.to_string(), "calorie-calculator".to_string()),
            (PRICE_CHECKER.to_string(), "web_search_exa".to_string()),
        ]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Handoff { from_agent, to_agent } if from_agent == ADVISOR && to_agent == PRICE_CHECKER
    )));

    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "| Meal | Price |\n| Egg fried rice | 2.10 EUR |");

    match events.last() {
        Some(RunEvent::Completed(result)) => assert_eq!(result.last_agent, PRICE_CHECKER),
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_streamed_trip_ends_with_guardrail_event() {
    let search = StaticSearchServer::new("unused");
    let agents = build_agents(search).await;
    let provider = Arc::new(MockProvider::new("test-model").with_agent_message(GUARDRAIL, OFF_TOPIC));

    let events: Vec<RunEvent> = Runner::run_stream(
        agents.nutrition_agent(),
        "Who won the football match?",
        RunConfig::new(provider),
    )
    .await
    .unwrap()
    .collect()
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], RunEvent::AgentStarted { agent } if agent == NUTRITION));
    assert!(matches!(&events[1], RunEvent::GuardrailTripped(trip) if trip.guardrail == "food_topic_guardrail"));
}
