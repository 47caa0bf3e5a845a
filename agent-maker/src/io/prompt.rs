//! System prompt rendering from embedded templates.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::tools::registry::ToolRegistry;
use crate::tools::{BuiltinToolInfo, Tool, list_builtin_tools};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const DESIGNER_TEMPLATE: &str = include_str!("prompts/designer.md");

/// Tool entry as shown to the model.
#[derive(Debug, Clone, Serialize)]
struct ToolContext {
    name: String,
    description: String,
    schema: String,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("designer", DESIGNER_TEMPLATE)
            .context("load designer template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        Ok(rendered.trim().to_string())
    }
}

/// Default system prompt for an agent with the given tools.
pub fn render_system_prompt(
    name: &str,
    description: &str,
    registry: &ToolRegistry,
) -> Result<String> {
    let tools = registry
        .tools()
        .map(|tool| {
            let schema = serde_json::to_string_pretty(&tool.schema())?;
            Ok(ToolContext {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                schema,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let engine = PromptEngine::new()?;
    let rendered = engine.render(
        "system",
        context! {
            name => name,
            description => (!description.trim().is_empty()).then(|| description.trim()),
            tools => tools,
        },
    )?;
    debug!(tools = registry.len(), chars = rendered.len(), "rendered system prompt");
    Ok(rendered)
}

/// System prompt for the spec designer, listing every built-in tool.
pub fn render_designer_prompt() -> Result<String> {
    let tools: Vec<BuiltinToolInfo> = list_builtin_tools();
    let engine = PromptEngine::new()?;
    engine.render("designer", context! { tools => tools })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ToolSettings;

    #[test]
    fn system_prompt_lists_tools_and_contract() {
        let registry =
            ToolRegistry::from_names(&["todo"], &ToolSettings::default()).expect("registry");
        let prompt = render_system_prompt("Helper", "Keeps lists.", &registry).expect("render");
        assert!(prompt.starts_with("You are Helper"));
        assert!(prompt.contains("Keeps lists."));
        assert!(prompt.contains("### todo"));
        assert!(prompt.contains("\"required\""));
        assert!(prompt.contains(r#"{"final": "<answer>"}"#));
    }

    #[test]
    fn system_prompt_keeps_plan_and_tool_apart() {
        let registry =
            ToolRegistry::from_names(&["todo"], &ToolSettings::default()).expect("registry");
        let prompt = render_system_prompt("Helper", "", &registry).expect("render");
        let tool_line = prompt
            .lines()
            .find(|line| line.starts_with("- To call a tool"))
            .expect("tool contract line");
        assert!(!tool_line.contains("\"plan\""));
        assert!(prompt.contains(r#"{"plan": ["...", "..."]}"#));
        assert!(prompt.contains("not both"));
    }

    #[test]
    fn system_prompt_without_tools_says_so() {
        let registry = ToolRegistry::from_names::<&str>(&[], &ToolSettings::default())
            .expect("registry");
        let prompt = render_system_prompt("Bare", "", &registry).expect("render");
        assert!(prompt.contains("No tools are available"));
        assert!(!prompt.contains("## Tools"));
    }

    #[test]
    fn designer_prompt_mentions_every_builtin() {
        let prompt = render_designer_prompt().expect("render");
        for info in list_builtin_tools() {
            assert!(prompt.contains(info.name), "missing {}", info.name);
        }
    }
}
