//! ABOUTME: Tests for execute_recipe composition, overrides and the recursion limit
//! ABOUTME: Sub-recipes share the parent context; nesting is depth-bounded

use recipeflow_core::{Context, RecipeError};
use recipeflow_engine::executor::{Executor, ExecutorConfig};
use recipeflow_engine::registry::{StepDeps, StepRegistry};
use recipeflow_engine::test_utils::bare_executor;
use serde_json::json;
use std::sync::Arc;

fn write_recipe(dir: &std::path::Path, name: &str, recipe: &serde_json::Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(recipe).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

/// Overrides apply before the sub-recipe and persist after it; sub-recipe
/// writes land in the parent context.
#[tokio::test]
async fn test_overrides_and_sub_writes_visible_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let sub_path = write_recipe(
        dir.path(),
        "sub.json",
        &json!({
            "steps": [
                {"type": "set_context", "config": {"key": "phase", "value": "sub"}},
                {"type": "set_context", "config": {"key": "saw_target", "value": "{{ target }}"}}
            ]
        }),
    );

    let exec = bare_executor();
    let recipe = exec
        .load(json!({
            "steps": [
                {"type": "set_context", "config": {"key": "phase", "value": "pre"}},
                {"type": "execute_recipe", "config": {
                    "recipe_path": sub_path,
                    "context_overrides": {"target": "gen"}
                }}
            ]
        }))
        .await
        .unwrap();

    let mut ctx = Context::new();
    exec.execute(&recipe, &mut ctx).await.unwrap();

    assert_eq!(ctx.get("phase").unwrap(), &json!("sub"));
    assert_eq!(ctx.get("target").unwrap(), &json!("gen"));
    // The override was in place before the sub-recipe ran.
    assert_eq!(ctx.get("saw_target").unwrap(), &json!("gen"));
}

#[tokio::test]
async fn test_recipe_path_is_templated() {
    let dir = tempfile::tempdir().unwrap();
    write_recipe(
        dir.path(),
        "build.json",
        &json!({
            "steps": [
                {"type": "set_context", "config": {"key": "ran", "value": true}}
            ]
        }),
    );

    let exec = bare_executor();
    let recipe = exec
        .load(json!({
            "steps": [
                {"type": "execute_recipe", "config": {
                    "recipe_path": "{{ recipe_dir }}/build.json"
                }}
            ]
        }))
        .await
        .unwrap();

    let mut ctx =
        Context::new().with_config("recipe_dir", json!(dir.path().to_string_lossy()));
    exec.execute(&recipe, &mut ctx).await.unwrap();
    assert_eq!(ctx.get("ran").unwrap(), &json!(true));
}

#[tokio::test]
async fn test_rendered_overrides_see_parent_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let sub_path = write_recipe(
        dir.path(),
        "sub.json",
        &json!({
            "steps": [
                {"type": "set_context", "config": {"key": "echo", "value": "{{ handoff }}"}}
            ]
        }),
    );

    let exec = bare_executor();
    let recipe = exec
        .load(json!({
            "steps": [
                {"type": "set_context", "config": {"key": "source", "value": "from-parent"}},
                {"type": "execute_recipe", "config": {
                    "recipe_path": sub_path,
                    "context_overrides": {
                        "handoff": "{{ source }}",
                        "nested": {"inner": "{{ source }}"}
                    }
                }}
            ]
        }))
        .await
        .unwrap();

    let mut ctx = Context::new();
    exec.execute(&recipe, &mut ctx).await.unwrap();
    assert_eq!(ctx.get("echo").unwrap(), &json!("from-parent"));
    assert_eq!(ctx.get("nested").unwrap(), &json!({"inner": "from-parent"}));
}

/// A self-recursive recipe is stopped by the depth limit: the default
/// limit of 32 admits 33 runs (depths 0 through 32) and fails the next.
#[tokio::test]
async fn test_recursion_limit_default_depth() {
    let dir = tempfile::tempdir().unwrap();
    let self_path = dir.path().join("self.json").to_string_lossy().into_owned();
    write_recipe(
        dir.path(),
        "self.json",
        &json!({
            "steps": [
                {"type": "set_context", "config": {"key": "marks", "value": [1], "if_exists": "merge"}},
                {"type": "execute_recipe", "config": {"recipe_path": self_path}}
            ]
        }),
    );

    let exec = bare_executor();
    let recipe = exec.load(self_path.as_str()).await.unwrap();

    let mut ctx = Context::new();
    let err = exec.execute(&recipe, &mut ctx).await.unwrap_err();
    match err.root_cause() {
        RecipeError::RecursionLimit { depth, limit } => {
            assert_eq!(*limit, 32);
            assert_eq!(*depth, 33);
        }
        other => panic!("expected recursion limit, got {other}"),
    }

    // One mark per execution that actually ran; no deeper execution.
    let marks = ctx.get("marks").unwrap().as_array().unwrap();
    assert_eq!(marks.len(), 33);
}

#[tokio::test]
async fn test_recursion_limit_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let self_path = dir.path().join("self.json").to_string_lossy().into_owned();
    write_recipe(
        dir.path(),
        "self.json",
        &json!({
            "steps": [
                {"type": "execute_recipe", "config": {"recipe_path": self_path}}
            ]
        }),
    );

    let registry = Arc::new(StepRegistry::with_builtins(StepDeps::default()));
    let exec = Executor::with_config(
        registry,
        ExecutorConfig {
            max_recursion_depth: 2,
        },
    );
    let recipe = exec.load(self_path.as_str()).await.unwrap();

    let mut ctx = Context::new();
    let err = exec.execute(&recipe, &mut ctx).await.unwrap_err();
    match err.root_cause() {
        RecipeError::RecursionLimit { limit, .. } => assert_eq!(*limit, 2),
        other => panic!("expected recursion limit, got {other}"),
    }
}

#[tokio::test]
async fn test_missing_sub_recipe_is_load_error() {
    let exec = bare_executor();
    let recipe = exec
        .load(json!({
            "steps": [
                {"type": "execute_recipe", "config": {"recipe_path": "/no/such/sub.json"}}
            ]
        }))
        .await
        .unwrap();

    let mut ctx = Context::new();
    let err = exec.execute(&recipe, &mut ctx).await.unwrap_err();
    assert!(matches!(err.root_cause(), RecipeError::Load { .. }));
}
