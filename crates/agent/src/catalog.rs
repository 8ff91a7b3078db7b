//! The agents Easel knows how to build.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Sage,
    Scholar,
    ImageGenerator,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Sage, AgentKind::Scholar, AgentKind::ImageGenerator];

    pub fn id(self) -> &'static str {
        match self {
            AgentKind::Sage => "sage",
            AgentKind::Scholar => "scholar",
            AgentKind::ImageGenerator => "image_generator",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Sage => "Sage",
            AgentKind::Scholar => "Scholar",
            AgentKind::ImageGenerator => "ImageGenerator",
        }
    }

    /// Look up an agent by id. Unknown ids get the Scholar.
    pub fn from_id(id: &str) -> Self {
        Self::lookup(id).unwrap_or(AgentKind::Scholar)
    }

    /// Strict lookup.
    pub fn lookup(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// Only the image generator talks to the tool server.
    pub fn uses_tools(self) -> bool {
        matches!(self, AgentKind::ImageGenerator)
    }

    pub fn description(self) -> &'static str {
        match self {
            AgentKind::Sage => "A general assistant that answers questions concisely.",
            AgentKind::Scholar => "A research assistant that explains topics in depth.",
            AgentKind::ImageGenerator => {
                "Creates images from text descriptions using an external image-generation service."
            }
        }
    }

    pub fn instructions(self) -> &'static str {
        match self {
            AgentKind::Sage => {
                "You are Sage. Answer clearly and briefly. Say so when you are unsure."
            }
            AgentKind::Scholar => {
                "You are Scholar. Explain the topic step by step and point out \
                 assumptions and open questions."
            }
            AgentKind::ImageGenerator => {
                "You are ImageGenerator. Understand the request, write an optimized \
                 prompt, then call the image generation tool and present the result \
                 with a short description. If no image tool is available, explain the \
                 concept you would generate and give prompt-writing guidance instead."
            }
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Ids of every agent in the catalog.
pub fn available_agents() -> Vec<&'static str> {
    AgentKind::ALL.iter().map(|kind| kind.id()).collect()
}
