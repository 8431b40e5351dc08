//! Template engine for agent prompts.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::{ContextPack, Critique, FrameworkTag};

const DRAFTER_TEMPLATE: &str = include_str!("prompts/drafter.md");
const REFINER_TEMPLATE: &str = include_str!("prompts/refiner.md");
const CRITIC_TEMPLATE: &str = include_str!("prompts/critic.md");

/// Repository coordinates shared by every prompt.
#[derive(Debug, Clone, Copy)]
pub struct TargetRef<'a> {
    pub repo: &'a str,
    pub version: &'a str,
    pub code_file: &'a str,
}

/// Wrapper around minijinja with the three agent templates registered.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("drafter", DRAFTER_TEMPLATE)
            .expect("drafter template should be valid");
        env.add_template("refiner", REFINER_TEMPLATE)
            .expect("refiner template should be valid");
        env.add_template("critic", CRITIC_TEMPLATE)
            .expect("critic template should be valid");
        Self { env }
    }

    pub fn render_drafter(
        &self,
        target: &TargetRef<'_>,
        pack: &ContextPack,
        framework: FrameworkTag,
    ) -> Result<String> {
        let template = self.env.get_template("drafter")?;
        template
            .render(context! {
                repo => target.repo,
                version => target.version,
                code_file => target.code_file,
                summary => (!pack.summary.is_empty()).then_some(pack.summary.as_str()),
                symbols => (!pack.symbols.is_empty()).then_some(&pack.symbols),
                code_src => pack.code_src,
                framework => framework.as_str(),
            })
            .context("render drafter prompt")
    }

    pub fn render_refiner(
        &self,
        target: &TargetRef<'_>,
        current: &str,
        framework: FrameworkTag,
        instructions: &[String],
        missing_lines: &[u32],
    ) -> Result<String> {
        let template = self.env.get_template("refiner")?;
        template
            .render(context! {
                repo => target.repo,
                version => target.version,
                code_file => target.code_file,
                framework => framework.as_str(),
                current => current,
                instructions => instructions,
                missing_lines => (!missing_lines.is_empty()).then_some(missing_lines),
            })
            .context("render refiner prompt")
    }

    pub fn render_critic(
        &self,
        critique: &Critique,
        success: bool,
        coverage: f64,
        target_coverage: f64,
        target_mutation: f64,
        test_error: Option<&str>,
        test_src: &str,
    ) -> Result<String> {
        let template = self.env.get_template("critic")?;
        template
            .render(context! {
                success => success,
                coverage => coverage,
                target_coverage => target_coverage,
                mutation_score => critique.mutation_score,
                target_mutation => target_mutation,
                lint_issue_count => critique.lint_issue_count,
                test_error => test_error.filter(|error| !error.is_empty()),
                missing_lines => (!critique.missing_lines.is_empty()).then_some(&critique.missing_lines),
                test_src => test_src,
            })
            .context("render critic prompt")
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack() -> ContextPack {
        ContextPack {
            summary: "Serve static files.".to_string(),
            symbols: vec!["serve".to_string(), "was_modified_since".to_string()],
            docstrings: vec![String::new(), String::new()],
            framework_hints: vec![FrameworkTag::UnittestDjango],
            code_src: "def serve():\n    pass\n".to_string(),
            parse_failed: false,
        }
    }

    fn target() -> TargetRef<'static> {
        TargetRef {
            repo: "django/django",
            version: "5.0",
            code_file: "django/views/static.py",
        }
    }

    #[test]
    fn drafter_prompt_embeds_source_and_django_rules() {
        let prompt = PromptEngine::new()
            .render_drafter(&target(), &pack(), FrameworkTag::UnittestDjango)
            .expect("render");

        assert!(prompt.contains("maximize branch coverage and mutation kill rate"));
        assert!(prompt.contains("def serve():"));
        assert!(prompt.contains("django.test"));
        assert!(prompt.contains("Do NOT import pytest"));
        assert!(prompt.contains("No network access and no database access."));
        assert!(prompt.contains("Output ONLY raw Python code"));
    }

    #[test]
    fn drafter_prompt_pytest_rules_allow_fixtures() {
        let prompt = PromptEngine::new()
            .render_drafter(&target(), &pack(), FrameworkTag::Pytest)
            .expect("render");
        assert!(prompt.contains("fixtures are allowed"));
        assert!(!prompt.contains("subclass unittest.TestCase"));
    }

    #[test]
    fn refiner_prompt_lists_instructions_in_order() {
        let instructions = vec![
            "Fix the syntax error.".to_string(),
            "Add coverage for lines: 3, 9.".to_string(),
        ];
        let prompt = PromptEngine::new()
            .render_refiner(
                &target(),
                "import unittest\n",
                FrameworkTag::UnittestPlain,
                &instructions,
                &[3, 9],
            )
            .expect("render");

        let first = prompt.find("Fix the syntax error.").expect("first instruction");
        let second = prompt.find("Add coverage for lines").expect("second instruction");
        assert!(first < second);
        assert!(prompt.contains("do NOT import pytest"));
        assert!(prompt.contains("no unittest.main()"));
    }

    #[test]
    fn critic_prompt_enumerates_the_six_categories() {
        let critique = Critique::baseline();
        let prompt = PromptEngine::new()
            .render_critic(&critique, false, 20.0, 60.0, 50.0, Some("boom"), "def test(): pass")
            .expect("render");

        for key in [
            "priority_issues",
            "coverage_suggestions",
            "mutation_suggestions",
            "code_quality_suggestions",
            "test_strategy_suggestions",
            "next_steps",
        ] {
            assert!(prompt.contains(key), "missing category {key}");
        }
        assert!(prompt.contains("runner error: boom"));
    }
}
