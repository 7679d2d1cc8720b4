//! Rule conditions using rhai scripting
//!
//! Rules may carry a short script such as `state.health < 0.5` that gates
//! whether the rule is turned into a recommendation. The current game state
//! is exposed to the script as the object map `state`.

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, Map, Scope, AST};
use std::collections::HashMap;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::shared::{GameState, Value, ValueMap};

/// Upper bound on script operations, keeps a bad condition from stalling ranking
const MAX_OPERATIONS: u64 = 10_000;

/// Compiles and evaluates rule conditions
pub struct ConditionEngine {
    engine: Engine,
    compiled: Mutex<HashMap<String, AST>>,
}

impl ConditionEngine {
    /// Create a new condition engine
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(32, 16);

        Self {
            engine,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Compile a condition, reporting syntax errors against `rule_id`
    pub fn validate(&self, rule_id: &str, script: &str) -> EngineResult<()> {
        self.compile(script).map(|_| ()).map_err(|message| EngineError::InvalidCondition {
            rule: rule_id.to_string(),
            message,
        })
    }

    fn compile(&self, script: &str) -> Result<AST, String> {
        if let Some(ast) = self.compiled.lock().get(script) {
            return Ok(ast.clone());
        }
        let ast = self.engine.compile(script).map_err(|e| e.to_string())?;
        self.compiled.lock().insert(script.to_string(), ast.clone());
        Ok(ast)
    }

    /// Evaluate a condition against the game state
    ///
    /// Compile errors, runtime errors and non-boolean results all count as
    /// `false`.
    pub fn evaluate(&self, script: &str, state: &GameState) -> bool {
        let ast = match self.compile(script) {
            Ok(ast) => ast,
            Err(e) => {
                warn!("Condition '{}' does not compile: {}", script, e);
                return false;
            }
        };

        let mut scope = Scope::new();
        scope.push("state", to_rhai_map(state));

        match self.engine.eval_ast_with_scope::<bool>(&mut scope, &ast) {
            Ok(result) => result,
            Err(e) => {
                warn!("Condition '{}' failed: {}", script, e);
                false
            }
        }
    }
}

impl Default for ConditionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn to_rhai_map(values: &ValueMap) -> Map {
    let mut map = Map::new();
    for (key, value) in values {
        map.insert(key.as_str().into(), to_dynamic(value));
    }
    map
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Number(n) => Dynamic::from(*n),
        Value::Bool(b) => Dynamic::from(*b),
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Rect(r) => {
            let mut map = Map::new();
            map.insert("x".into(), Dynamic::from(r.x));
            map.insert("y".into(), Dynamic::from(r.y));
            map.insert("width".into(), Dynamic::from(r.width));
            map.insert("height".into(), Dynamic::from(r.height));
            Dynamic::from(map)
        }
        Value::Map(m) => Dynamic::from(to_rhai_map(m)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Rect;

    #[test]
    fn test_numeric_condition() {
        let engine = ConditionEngine::new();
        let low = GameState::new().with("health", 0.3);
        let high = GameState::new().with("health", 0.9);

        assert!(engine.evaluate("state.health < 0.5", &low));
        assert!(!engine.evaluate("state.health < 0.5", &high));
    }

    #[test]
    fn test_text_bool_and_rect() {
        let engine = ConditionEngine::new();
        let state = GameState::new()
            .with("phase", "boss")
            .with("paused", false)
            .with("player", Rect::new(10.0, 20.0, 5.0, 5.0));

        assert!(engine.evaluate(r#"state.phase == "boss" && !state.paused"#, &state));
        assert!(engine.evaluate("state.player.x > 5.0", &state));
    }

    #[test]
    fn test_missing_key_is_false() {
        let engine = ConditionEngine::new();
        assert!(!engine.evaluate("state.health < 0.5", &GameState::new()));
    }

    #[test]
    fn test_non_bool_result_is_false() {
        let engine = ConditionEngine::new();
        assert!(!engine.evaluate("42", &GameState::new()));
    }

    #[test]
    fn test_validate_reports_syntax_errors() {
        let engine = ConditionEngine::new();
        assert!(engine.validate("r1", "state.health < 0.5").is_ok());

        let err = engine.validate("r2", "state.health <").unwrap_err();
        assert!(matches!(err, EngineError::InvalidCondition { ref rule, .. } if rule == "r2"));
    }

    #[test]
    fn test_runaway_script_is_stopped() {
        let engine = ConditionEngine::new();
        assert!(!engine.evaluate("loop {} true", &GameState::new()));
    }
}
