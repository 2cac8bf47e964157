//! Terminal chat with the nutrition agents.
//!
//! ```text
//! nutrition_chat [--agent nutrition|advisor|simple] [--session <id>]
//! ```
//!
//! Answers stream to stdout as they are generated. `/reset` forgets the
//! conversation, `/quit` exits.

use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use nutrition_agents::knowledge::{CalorieLookupTool, OpenAIEmbedder, SqliteNutritionStore};
use nutrition_agents::{
    Agent, AgentPrompts, AgentsError, AppConfig, McpSearchServer, NutritionAgents, RunConfig,
    RunEvent, Runner, Session, SqliteSession, ToolServer,
};

const REFUSAL: &str = "Sorry, I can only help with questions about food and nutrition.";
const DEFAULT_SESSION: &str = "conversation_history";

struct Args {
    agent: String,
    session: String,
}

fn parse_args() -> nutrition_agents::Result<Args> {
    let mut args = Args {
        agent: "nutrition".to_string(),
        session: DEFAULT_SESSION.to_string(),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let slot = match arg.as_str() {
            "--agent" => &mut args.agent,
            "--session" => &mut args.session,
            other => {
                return Err(AgentsError::UserError {
                    message: format!("unknown argument '{}'", other),
                })
            }
        };
        *slot = it.next().ok_or_else(|| AgentsError::UserError {
            message: format!("{} needs a value", arg),
        })?;
    }
    Ok(args)
}

fn pick_agent(agents: &NutritionAgents, choice: &str) -> nutrition_agents::Result<Agent> {
    match choice {
        "nutrition" => Ok(agents.nutrition_agent()),
        "advisor" => Ok(agents.breakfast_advisor_guarded.clone()),
        "simple" => Ok(agents.simple_calorie_agent.clone()),
        other => Err(AgentsError::UserError {
            message: format!("unknown agent '{}', expected nutrition, advisor or simple", other),
        }),
    }
}

#[tokio::main]
async fn main() -> nutrition_agents::Result<()> {
    dotenvy::dotenv().ok();
    nutrition_agents::init_tracing();

    let args = parse_args()?;
    let config = AppConfig::from_env()?;
    let prompts = AgentPrompts::load(config.prompts_path.as_deref())?;

    let embedder = Arc::new(OpenAIEmbedder::new(
        config.openai_client(),
        &config.store.embedding_model,
    ));
    let store = SqliteNutritionStore::open(
        &config.store.nutrition_db_path,
        &config.store.collection,
        embedder,
    )
    .await?;
    if store.count().await? == 0 {
        warn!("the nutrition database is empty; run build_calorie_db first");
    }
    let lookup = Arc::new(CalorieLookupTool::new(Arc::new(store)));

    let search = match &config.search {
        Some(search_config) => {
            let server = McpSearchServer::new(search_config.clone())?;
            if let Err(e) = server.connect().await {
                warn!(error = %e, "search server unavailable, continuing without web search");
            }
            Some(server)
        }
        None => {
            warn!("EXA_API_KEY is not set, web search is disabled");
            None
        }
    };
    let tool_server = search
        .clone()
        .map(|s| Arc::new(s) as Arc<dyn ToolServer>);

    let agents = NutritionAgents::build(&prompts, lookup, tool_server);
    let agent = pick_agent(&agents, &args.agent)?;
    let session: Arc<dyn Session> = Arc::new(
        SqliteSession::new(args.session.as_str(), &config.store.session_db_path).await?,
    );
    let provider = config.provider();
    info!(agent = %agent.name(), session = %session.session_id(), "chat ready");

    println!("Ask about food and calories. /reset clears the conversation, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.clear_session().await?;
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let run_config = RunConfig::new(provider.clone()).with_session(session.clone());
        let mut events = Runner::run_stream(agent.clone(), input, run_config).await?;
        while let Some(event) = events.next().await {
            match event {
                RunEvent::TextDelta { delta, .. } => {
                    print!("{}", delta);
                    std::io::stdout().flush()?;
                }
                RunEvent::ToolCallStarted {
                    tool_name,
                    arguments,
                    ..
                } => println!("\nTool call: {} with args: {}", tool_name, arguments),
                RunEvent::Handoff { to_agent, .. } => println!("\n[{} takes over]", to_agent),
                RunEvent::GuardrailTripped(_) => println!("{}", REFUSAL),
                RunEvent::Completed(_) => println!(),
                RunEvent::Failed { error } => eprintln!("\nError: {}", error),
                RunEvent::AgentStarted { .. } | RunEvent::ToolCallFinished { .. } => {}
            }
        }
    }

    if let Some(server) = search {
        server.close().await;
    }
    Ok(())
}
