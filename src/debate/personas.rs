//! Debate personas and the registry that holds them.
//!
//! A persona is a fixed prompt template plus metadata: who the agent is, what
//! it is trying to achieve, how it talks, and how long its replies may be.
//! The registry is built once (from the built-in pair or a YAML file) and is
//! read-only while debates run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Default response budget for the built-in personas, in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 250;

// ============================================================================
// Persona
// ============================================================================

/// A named, fixed behavioral configuration for one debate participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Registry key, also used as the agent name on recorded turns.
    pub name: String,
    /// Short role title (e.g. "The Skeptical Critic").
    pub role: String,
    /// What the persona is trying to achieve in the debate.
    pub goal: String,
    /// Backstory and speaking style.
    pub backstory: String,
    /// Ceiling on generated tokens per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-turn directives. `{subject}` is replaced with the debate subject.
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Description of the reply the persona should produce.
    #[serde(default)]
    pub expected_output: Option<String>,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Persona {
    /// Creates a persona with no per-turn instructions.
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            max_tokens,
            instructions: Vec::new(),
            expected_output: None,
        }
    }

    /// Sets the per-turn directives.
    pub fn with_instructions(
        mut self,
        instructions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected output description.
    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    /// Renders the system instruction for this persona.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {role}.\n\nYOUR GOAL:\n{goal}\n\nBACKSTORY AND STYLE:\n{backstory}\n\nKeep every reply under {max} tokens.",
            role = self.role,
            goal = self.goal,
            backstory = self.backstory.trim(),
            max = self.max_tokens,
        )
    }

    /// Renders the per-turn instructions for a subject as a numbered list.
    pub fn render_instructions(&self, subject: &str) -> String {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line.replace("{subject}", subject)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPersona {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.role.trim().is_empty() {
            return Err(invalid("role must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// On-disk layout of a persona file.
#[derive(Debug, Deserialize)]
struct PersonaFile {
    personas: Vec<Persona>,
}

/// Lookup table of personas keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: BTreeMap<String, Persona>,
}

impl PersonaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `skeptic` and `optimist`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for persona in [skeptic(), optimist()] {
            registry
                .personas
                .insert(persona.name.clone(), persona);
        }
        registry
    }

    /// Builds a registry from a list of personas.
    pub fn from_personas(personas: impl IntoIterator<Item = Persona>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for persona in personas {
            registry.register_persona(persona)?;
        }
        Ok(registry)
    }

    /// Parses a registry from YAML of the form `personas: [ ... ]`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let file: PersonaFile = serde_yaml::from_str(yaml)?;
        Self::from_personas(file.personas)
    }

    /// Loads a registry from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let registry = Self::from_yaml_str(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            count = registry.len(),
            "Loaded personas from file"
        );
        Ok(registry)
    }

    /// Adds a persona. Names must be unique.
    pub fn register_persona(&mut self, persona: Persona) -> Result<(), RegistryError> {
        persona.validate()?;
        if self.personas.contains_key(&persona.name) {
            return Err(RegistryError::DuplicatePersona(persona.name));
        }
        self.personas.insert(persona.name.clone(), persona);
        Ok(())
    }

    /// Looks up a persona by name.
    pub fn get_persona(&self, id: &str) -> Result<&Persona, RegistryError> {
        self.personas
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Registered persona names in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.personas.keys().map(String::as_str).collect()
    }

    /// Iterates over all personas in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

// ============================================================================
// Built-in Personas
// ============================================================================

const SKEPTIC_BACKSTORY: &str = "You are a highly analytical skeptic with an IQ of 140. \
You question everything, demand evidence, and often point out logical fallacies in \
others' arguments. You have a slightly condescending tone and enjoy proving others \
wrong with facts and logic.";

const OPTIMIST_BACKSTORY: &str = "You are an enthusiastic optimist with an IQ of 135. \
You believe in human potential and always look for the bright side. You get frustrated \
with negativity and often mock pessimistic viewpoints with humor and counter-examples.";

fn skeptic() -> Persona {
    Persona::new(
        "skeptic",
        "The Skeptical Critic",
        "Challenge every statement with logical reasoning and evidence",
        SKEPTIC_BACKSTORY,
        DEFAULT_MAX_TOKENS,
    )
    .with_instructions([
        "Present a skeptical view of \"{subject}\"",
        "If responding to the optimist, directly challenge their points",
        "Use evidence and logic to support your position",
        "Include at least one mocking or dismissive comment about opposing views",
        "Keep the response between 200 and 250 tokens",
    ])
    .with_expected_output("A skeptical argument with evidence and a dismissive comment")
}

fn optimist() -> Persona {
    Persona::new(
        "optimist",
        "The Passionate Optimist",
        "Defend positive viewpoints and find hope in every situation",
        OPTIMIST_BACKSTORY,
        DEFAULT_MAX_TOKENS,
    )
    .with_instructions([
        "Present an optimistic view of \"{subject}\"",
        "Counter the skeptic's arguments with enthusiasm",
        "Use examples and positive evidence",
        "Include humor or light mockery of the skeptic's pessimism",
        "Keep the response between 200 and 250 tokens",
    ])
    .with_expected_output("An optimistic counter-argument with humor")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = PersonaRegistry::builtin();
        assert_eq!(registry.ids(), vec!["optimist", "skeptic"]);

        let skeptic = registry.get_persona("skeptic").expect("skeptic is built in");
        assert_eq!(skeptic.role, "The Skeptical Critic");
        assert_eq!(skeptic.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(skeptic.instructions.len(), 5);
    }

    #[test]
    fn test_get_persona_not_found() {
        let registry = PersonaRegistry::builtin();
        match registry.get_persona("cynic") {
            Err(RegistryError::NotFound(id)) => assert_eq!(id, "cynic"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_register_persona_rejects_duplicates_and_invalid() {
        let mut registry = PersonaRegistry::builtin();

        let dup = Persona::new("skeptic", "Another", "goal", "story", 100);
        assert!(matches!(
            registry.register_persona(dup),
            Err(RegistryError::DuplicatePersona(_))
        ));

        let zero_budget = Persona::new("mute", "The Mute", "goal", "story", 0);
        assert!(matches!(
            registry.register_persona(zero_budget),
            Err(RegistryError::InvalidPersona { .. })
        ));

        let judge = Persona::new("judge", "The Judge", "Weigh both sides", "Calm.", 120);
        registry.register_persona(judge).expect("new persona registers");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_system_prompt_contains_persona_fields() {
        let persona = Persona::new("judge", "The Judge", "Weigh both sides", "Calm and fair.", 120);
        let prompt = persona.system_prompt();
        assert!(prompt.contains("The Judge"));
        assert!(prompt.contains("Weigh both sides"));
        assert!(prompt.contains("Calm and fair."));
        assert!(prompt.contains("120 tokens"));
    }

    #[test]
    fn test_render_instructions_substitutes_subject() {
        let registry = PersonaRegistry::builtin();
        let optimist = registry.get_persona("optimist").expect("built in");
        let rendered = optimist.render_instructions("Remote work is better than office work");
        assert!(rendered.starts_with("1. Present an optimistic view of \"Remote work"));
        assert_eq!(rendered.lines().count(), 5);
        assert!(!rendered.contains("{subject}"));
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
personas:
  - name: historian
    role: The Historian
    goal: Ground the debate in precedent
    backstory: You cite history.
    max_tokens: 180
    instructions:
      - "Find a historical parallel to \"{subject}\""
  - name: futurist
    role: The Futurist
    goal: Extrapolate trends
    backstory: You think in decades.
"#;
        let registry = PersonaRegistry::from_yaml_str(yaml).expect("valid yaml");
        assert_eq!(registry.ids(), vec!["futurist", "historian"]);

        let futurist = registry.get_persona("futurist").expect("loaded");
        assert_eq!(futurist.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(futurist.instructions.is_empty());
        assert!(futurist.expected_output.is_none());

        let historian = registry.get_persona("historian").expect("loaded");
        assert_eq!(historian.max_tokens, 180);
    }

    #[test]
    fn test_from_yaml_str_rejects_duplicates() {
        let yaml = r#"
personas:
  - { name: a, role: A, goal: g, backstory: b }
  - { name: a, role: A2, goal: g, backstory: b }
"#;
        assert!(matches!(
            PersonaRegistry::from_yaml_str(yaml),
            Err(RegistryError::DuplicatePersona(_))
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("personas.yaml");
        std::fs::write(
            &path,
            "personas:\n  - { name: judge, role: The Judge, goal: Decide, backstory: Fair }\n",
        )
        .expect("write yaml");

        let registry = PersonaRegistry::from_yaml_file(&path).expect("loads");
        assert!(registry.get_persona("judge").is_ok());

        let missing = PersonaRegistry::from_yaml_file(dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(RegistryError::Io(_))));
    }
}
