//! `easel agents` — List the agent catalog.

use easel_agent::AgentKind;

pub fn run() {
    println!();
    println!("  Available agents:");
    println!();
    for kind in AgentKind::ALL {
        let tools = if kind.uses_tools() { "  [tools]" } else { "" };
        println!("  {:<16} {}{tools}", kind.id(), kind.description());
    }
    println!();
    println!("  Run one with: easel agent -a <id>");
    println!();
}
