//! Policy bundle loading.
//!
//! A bundle is a directory tree of `.rego` files, optionally with `data.json`
//! documents mounted in `data` at their directory path (`limits/data.json`
//! becomes `data.limits`). It is loaded once at startup;
//! any problem here is fatal to the policy service. There is no hot reload:
//! a new bundle means a restart.

use super::engine::{ResultSet, RuleEvaluator};
use super::PolicyError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("No policy directory provided")]
    MissingPath,

    #[error("Could not load \"{path}\": {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("\"{0}\" is not a directory")]
    NotADirectory(PathBuf),

    #[error("\"{0}\" contains no .rego files")]
    Empty(PathBuf),

    #[error("Could not compile \"{path}\": {message}")]
    Compile { path: PathBuf, message: String },

    #[error("Could not set up \"{query}\" evaluator: {message}")]
    Prepare { query: String, message: String },
}

/// A compiled, read-only Rego rule set bound to one query.
///
/// Every evaluation works on its own clone of the prepared engine, so the
/// loaded rules are never mutated and need no locking.
#[derive(Clone)]
pub struct RegoEvaluator {
    engine: regorus::Engine,
    query: String,
}

impl std::fmt::Debug for RegoEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegoEvaluator")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl RegoEvaluator {
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Load and compile every policy under `dir`, prepared for `query`.
pub fn load_bundle(dir: impl AsRef<Path>, query: &str) -> Result<RegoEvaluator, BundleError> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Err(BundleError::MissingPath);
    }

    let metadata = std::fs::metadata(dir).map_err(|source| BundleError::Unreadable {
        path: dir.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(BundleError::NotADirectory(dir.to_path_buf()));
    }

    let mut engine = regorus::Engine::new();
    let mut policies = 0usize;
    let mut documents = 0usize;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BundleError::Unreadable {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_rego = path.extension().is_some_and(|ext| ext == "rego");
        let is_data = path.file_name().is_some_and(|name| name == "data.json");
        if !is_rego && !is_data {
            continue;
        }

        let source = std::fs::read_to_string(path).map_err(|source| BundleError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let compile_error = |message: String| BundleError::Compile {
            path: path.to_path_buf(),
            message,
        };

        if is_rego {
            engine
                .add_policy(path.display().to_string(), source)
                .map_err(|e| compile_error(e.to_string()))?;
            policies += 1;
        } else {
            let mounted = mount_document(dir, path, &source).map_err(compile_error)?;
            let data = regorus::Value::from_json_str(&mounted)
                .map_err(|e| compile_error(e.to_string()))?;
            engine
                .add_data(data)
                .map_err(|e| compile_error(e.to_string()))?;
            documents += 1;
        }
    }

    if policies == 0 {
        return Err(BundleError::Empty(dir.to_path_buf()));
    }

    // Evaluate once against an empty input so rule errors surface at load.
    let prepare_error = |message: String| BundleError::Prepare {
        query: query.to_string(),
        message,
    };
    let mut probe = engine.clone();
    let empty = regorus::Value::from_json_str("{}").map_err(|e| prepare_error(e.to_string()))?;
    probe.set_input(empty);
    let results = probe
        .eval_query(query.to_string(), false)
        .map_err(|e| prepare_error(e.to_string()))?;
    if results.result.is_empty() {
        return Err(prepare_error("query is undefined in this bundle".to_string()));
    }

    tracing::info!(
        path = %dir.display(),
        policies,
        documents,
        query,
        "Policy bundle loaded"
    );

    Ok(RegoEvaluator {
        engine,
        query: query.to_string(),
    })
}

/// Nest a `data.json` document under its directory path relative to the
/// bundle root, so `a/b/data.json` becomes `{"a": {"b": <document>}}`.
fn mount_document(root: &Path, path: &Path, source: &str) -> Result<String, String> {
    let mut document: serde_json::Value =
        serde_json::from_str(source).map_err(|e| format!("invalid JSON: {}", e))?;

    let parent = path.parent().unwrap_or(root);
    let relative = parent
        .strip_prefix(root)
        .map_err(|_| "document lies outside the bundle".to_string())?;

    let segments = relative
        .components()
        .map(|component| {
            component
                .as_os_str()
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| format!("non UTF-8 directory name in {}", relative.display()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for segment in segments.into_iter().rev() {
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(segment, document);
        document = serde_json::Value::Object(wrapper);
    }

    Ok(document.to_string())
}

#[async_trait]
impl RuleEvaluator for RegoEvaluator {
    async fn evaluate(&self, input: serde_json::Value) -> Result<Vec<ResultSet>, PolicyError> {
        let mut engine = self.engine.clone();
        let query = self.query.clone();

        // Evaluation is CPU-bound; keep it off the async workers. A caller
        // that gives up (deadline or cancellation) stops waiting immediately,
        // the blocking task finishes on its own.
        let task = tokio::task::spawn_blocking(move || -> Result<Vec<ResultSet>, PolicyError> {
            let input = regorus::Value::from_json_str(&input.to_string())
                .map_err(|e| PolicyError::InvalidInput(format!("unable to process input: {}", e)))?;
            engine.set_input(input);

            let results = engine
                .eval_query(query, false)
                .map_err(|e| PolicyError::Evaluation(format!("cannot check permissions: {}", e)))?;

            results
                .result
                .into_iter()
                .map(|result| {
                    result
                        .expressions
                        .iter()
                        .map(|expression| serde_json::to_value(&expression.value))
                        .collect::<Result<Vec<_>, _>>()
                        .map(|expressions| ResultSet { expressions })
                        .map_err(|e| PolicyError::Evaluation(e.to_string()))
                })
                .collect::<Result<Vec<_>, PolicyError>>()
        });

        task.await
            .map_err(|e| PolicyError::Evaluation(format!("evaluation task failed: {}", e)))?
    }
}
