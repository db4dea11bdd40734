//! `vocalis learn` — Knowledge base ingestion.

use super::{build_orchestrator, load_config};

pub async fn learn(fact: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;

    match orchestrator.add_knowledge(fact).await? {
        Some(id) => println!("✅ Stored fact {id}"),
        None => println!("  Nothing to store: the fact is empty."),
    }
    Ok(())
}
