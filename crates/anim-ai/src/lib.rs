use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub mod openai;
pub mod validate;

pub use openai::OpenAiModel;
pub use validate::{ClampReport, MAX_TOTAL_PARTICLES};

pub const GENERATION_SYSTEM_PROMPT: &str = r##"You are an animation config generator. Convert natural language descriptions into JSON configurations for browser-rendered animations with physics simulations.

You must respond with ONLY valid JSON, no other text.

SUPPORTED MODES:

1. SCRIPTED ANIMATIONS (simple objects with predefined movements):
{
  "duration": 10,
  "fps": 60,
  "resolution": [1920, 1080],
  "camera": {
    "type": "static",
    "position": [0, 0, 20],
    "lookAt": [0, 0, 0]
  },
  "objects": [
    {
      "type": "sphere",
      "radius": 1,
      "color": "#ff0000",
      "opacity": 1.0,
      "position": [0, 0, 0],
      "animation": {
        "type": "rotation",
        "axis": [0, 1, 0],
        "speed": 0.01
      }
    }
  ],
  "background": "transparent"
}

2. PHYSICS SIMULATIONS WITH PARTICLE GROUPS (realistic planetary formation):
{
  "duration": 20,
  "fps": 60,
  "resolution": [1920, 1080],
  "simulation": {
    "type": "gravity",
    "centerAttraction": 0.15,
    "damping": 0.98,
    "differentialMass": true
  },
  "particleGroups": [
    {
      "name": "iron-core",
      "count": 800,
      "element": "iron",
      "color": "#2F4F4F",
      "opacity": 0.7,
      "mass": 3.0,
      "size": 0.1,
      "distribution": {
        "type": "sphere",
        "radiusMin": 0,
        "radiusMax": 8,
        "clustering": 0.7
      }
    },
    {
      "name": "silicate-mantle",
      "count": 2000,
      "element": "silicate",
      "color": "#8B4513",
      "opacity": 0.6,
      "mass": 1.5,
      "size": 0.08,
      "distribution": {
        "type": "sphere",
        "radiusMin": 5,
        "radiusMax": 15,
        "clustering": 0.5
      }
    },
    {
      "name": "ice-volatiles",
      "count": 1200,
      "element": "ice",
      "color": "#B0E0E6",
      "opacity": 0.5,
      "mass": 0.5,
      "size": 0.06,
      "distribution": {
        "type": "sphere",
        "radiusMin": 12,
        "radiusMax": 20,
        "clustering": 0.3
      }
    }
  ],
  "phases": [
    {
      "time": 0,
      "centerAttraction": 0.05,
      "particleOpacity": 0.8,
      "moltenCore": {
        "enabled": false
      }
    },
    {
      "time": 8,
      "centerAttraction": 0.25,
      "particleOpacity": 0.6,
      "moltenCore": {
        "enabled": true,
        "radius": 2.5,
        "glowColor": "#FF4500",
        "temperature": 5000
      }
    },
    {
      "time": 16,
      "centerAttraction": 0.15,
      "particleOpacity": 0.5,
      "moltenCore": {
        "enabled": true,
        "radius": 2.0,
        "glowColor": "#FF6347",
        "temperature": 3000,
        "surfaceCrust": true
      }
    }
  ],
  "camera": {
    "type": "orbit",
    "distance": 30,
    "speed": 0.1
  },
  "background": "transparent"
}

PARTICLE ELEMENTS AND PROPERTIES:
- iron/nickel (core): Dark gray/metallic colors, high mass (2.5-3.5), inner distribution
- silicate (mantle): Brown/orange colors, medium mass (1.0-2.0), middle distribution
- ice/volatiles (outer): Light blue/white colors, low mass (0.3-0.8), outer distribution
- Use opacity 0.4-0.8 so you can see through to inner layers when formed

OPACITY RULES:
- Particles should have opacity 0.5-0.8 to show internal structure
- As planet forms, reduce opacity slightly (0.8 -> 0.5) to reveal layers
- Molten core can have higher opacity/glow
- Ice particles can be more transparent (0.4-0.6)

MOLTEN CORE PHASES:
- Phase 1: Dust cloud, no molten core
- Phase 2: Compression starts, molten core begins forming
- Phase 3: Fully formed planet with glowing molten core visible inside

RULES:
- Max total particles across all groups: 10000
- FPS: 30 or 60 only
- Background: "transparent" or hex color
- Camera types: "static" or "orbit"
- Distribution types: "sphere", "random", "grid"
- Clustering: 0.0-1.0 (how clumped particles are)
- For planetary formation, use particleGroups with different elements
- Heavy elements sink to core, light elements stay on surface

EXAMPLES:
"5 red spheres rotating" -> scripted animation mode
"planetary formation" -> physics simulation with particleGroups (iron core, silicate mantle, ice outer)
"dust cloud forming into a planet with visible layers" -> particleGroups with transparency
"show me iron sinking to the core as a planet forms" -> particleGroups with differentialMass

Output ONLY the JSON config, nothing else."##;

pub const EDIT_SYSTEM_PROMPT: &str = r#"You are an animation config editor. Given a current animation config and a user's edit request, modify ONLY the relevant parameters.

Rules:
- Preserve all unchanged fields exactly as they are
- Only modify parameters related to the user's request
- Return the COMPLETE modified config (not just changed fields)
- Maintain all required fields
- Provide brief explanation of what changed

USER REQUEST MAPPINGS:
"faster" / "speed up" -> increase centerAttraction or reduce damping
"slower" / "slow down" -> decrease centerAttraction or increase damping
"bigger particles" -> increase particle size
"smaller particles" -> decrease particle size
"more particles" -> increase count (max 10000 total)
"fewer particles" -> decrease count
"different color" / "more red/blue/etc" -> change color values
"longer" / "shorter" -> change duration
"more transparent" -> reduce opacity
"less transparent" -> increase opacity
"stronger gravity" -> increase centerAttraction
"weaker gravity" -> decrease centerAttraction
"more glow" -> increase moltenCore temperature and adjust glowColor
"less glow" -> decrease moltenCore temperature
"see inside better" -> reduce particle opacity

For particle groups:
- Changes to "iron" affect iron-core group
- Changes to "rock" or "mantle" affect silicate group
- Changes to "ice" affect ice-volatiles group

Output JSON format:
{
  "config": { /* full modified config */ },
  "changes": "Brief description of what changed"
}"#;

pub const EXAMPLE_PROMPTS: [&str; 3] = [
    "Try: \"Show me a rotating red sphere\"",
    "Try: \"Create a planetary formation animation from dust\"",
    "Try: \"1000 particles with gravity forming into a ball\"",
];

pub const MAX_ATTEMPTS: usize = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
pub const GENERATION_TEMPERATURE: f64 = 0.7;
pub const EDIT_TEMPERATURE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    MissingCredential,
    Network(String),
    Api { status: u16, message: String },
    MalformedResponse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingCredential => {
                f.write_str("no API credential was configured for the completion provider")
            }
            ProviderError::Network(message) => {
                write!(f, "completion request failed: {message}")
            }
            ProviderError::Api { status, message } => {
                write!(f, "completion provider returned status {status}: {message}")
            }
            ProviderError::MalformedResponse(message) => {
                write!(f, "completion provider returned a malformed response: {message}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// One round-trip to the text-completion provider. Implementations must ask
/// the provider for a JSON-only completion; retries belong to the caller.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    Provider(ProviderError),
    Parse(String),
    Validation(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Provider(error) => write!(f, "{error}"),
            AttemptError::Parse(message) => {
                write!(f, "response was not valid JSON: {message}")
            }
            AttemptError::Validation(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for AttemptError {}

impl From<ProviderError> for AttemptError {
    fn from(value: ProviderError) -> Self {
        Self::Provider(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    EmptyPrompt,
    ExhaustedRetries {
        attempts: usize,
        last_error: AttemptError,
    },
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::EmptyPrompt => f.write_str("prompt must not be empty"),
            GenerationError::ExhaustedRetries {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "failed to produce a valid animation config after {attempts} attempt(s): {last_error}"
                )
            }
        }
    }
}

impl std::error::Error for GenerationError {}

#[derive(Debug, Clone)]
pub struct GenerationSuccess {
    pub config: Value,
    pub attempts: usize,
    pub clamp: ClampReport,
}

#[derive(Debug, Clone)]
pub struct EditSuccess {
    pub config: Value,
    pub changes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditError {
    MissingInput,
    Provider(ProviderError),
    Parse(String),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::MissingInput => {
                f.write_str("edit requires a current config and a non-empty edit prompt")
            }
            EditError::Provider(error) => write!(f, "{error}"),
            EditError::Parse(message) => {
                write!(f, "edit response was not usable: {message}")
            }
        }
    }
}

impl std::error::Error for EditError {}

impl From<ProviderError> for EditError {
    fn from(value: ProviderError) -> Self {
        Self::Provider(value)
    }
}

pub struct ConfigGenerator {
    model: Box<dyn CompletionModel>,
    system_prompt: String,
    edit_system_prompt: String,
}

impl ConfigGenerator {
    pub fn new(model: Box<dyn CompletionModel>) -> Self {
        Self {
            model,
            system_prompt: GENERATION_SYSTEM_PROMPT.to_string(),
            edit_system_prompt: EDIT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_edit_system_prompt(mut self, edit_system_prompt: impl Into<String>) -> Self {
        self.edit_system_prompt = edit_system_prompt.into();
        self
    }

    /// Generation pipeline: completion, parse, gate-field check, clamp, with
    /// up to three attempts separated by a flat one-second delay. The first
    /// valid config wins; the final attempt's error is carried on failure.
    pub async fn generate(&self, user_prompt: &str) -> Result<GenerationSuccess, GenerationError> {
        if user_prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let mut attempt = 1;
        loop {
            match self.attempt_generation(user_prompt).await {
                Ok((config, clamp)) => {
                    tracing::info!(attempt, "generated valid animation config");
                    return Ok(GenerationSuccess {
                        config,
                        attempts: attempt,
                        clamp,
                    });
                }
                Err(error) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, %error, "generation attempt failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(attempt, %error, "generation attempt failed, retries exhausted");
                    return Err(GenerationError::ExhaustedRetries {
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }
        }
    }

    async fn attempt_generation(
        &self,
        user_prompt: &str,
    ) -> Result<(Value, ClampReport), AttemptError> {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(user_prompt),
            ],
            temperature: GENERATION_TEMPERATURE,
        };

        let raw = self.model.complete(request).await?;
        let mut config = validate::parse_config(&raw)?;
        validate::validate_config(&config)?;
        let clamp = validate::clamp_particle_counts(&mut config);
        Ok((config, clamp))
    }

    /// Edit pipeline: a single completion carrying the serialized current
    /// config plus the edit request, expecting a `{config, changes}` pair
    /// back. No retry and no clamping on this path.
    pub async fn apply_edit(
        &self,
        current_config: &Value,
        edit_prompt: &str,
    ) -> Result<EditSuccess, EditError> {
        if current_config.is_null() || edit_prompt.trim().is_empty() {
            return Err(EditError::MissingInput);
        }

        let serialized = serde_json::to_string_pretty(current_config)
            .map_err(|error| EditError::Parse(format!("current config failed to serialize: {error}")))?;
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(self.edit_system_prompt.clone()),
                ChatMessage::user(format!(
                    "Current config:\n{serialized}\n\nEdit request: {edit_prompt}"
                )),
            ],
            temperature: EDIT_TEMPERATURE,
        };

        let raw = self.model.complete(request).await?;
        let response: Value =
            serde_json::from_str(&raw).map_err(|error| EditError::Parse(error.to_string()))?;

        let config = response
            .get("config")
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| EditError::Parse("missing the config field".to_string()))?;
        let changes = response
            .get("changes")
            .and_then(Value::as_str)
            .ok_or_else(|| EditError::Parse("missing the changes field".to_string()))?
            .to_string();

        tracing::info!(changes = %changes, "applied edit to animation config");
        Ok(EditSuccess { config, changes })
    }
}
