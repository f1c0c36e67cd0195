use std::path::PathBuf;

use super::{Config, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("LECTERN_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid LECTERN_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LECTERN_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LECTERN_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LECTERN_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(n) = parsed::<usize>("LECTERN_MAX_HISTORY") {
            self.agent.max_history = n;
        }
        if let Some(n) = parsed::<usize>("LECTERN_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = n;
        }
        if let Some(n) = parsed::<usize>("LECTERN_MAX_SESSIONS") {
            self.agent.max_sessions = n;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Some(n) = parsed::<usize>("LECTERN_CHUNK_SIZE") {
            self.chunking.chunk_size = n;
        }
        if let Some(n) = parsed::<usize>("LECTERN_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = n;
        }
        if let Ok(v) = std::env::var("LECTERN_INDEX_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.index.backend = backend;
            } else {
                tracing::warn!("ignoring invalid LECTERN_INDEX_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LECTERN_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Some(n) = parsed::<usize>("LECTERN_MAX_RESULTS") {
            self.index.max_results = n;
        }
        if let Some(d) = parsed::<f32>("LECTERN_COURSE_MATCH_MAX_DISTANCE") {
            self.index.course_match_max_distance = Some(d);
        }
        if let Ok(v) = std::env::var("LECTERN_DOCS_PATH") {
            self.ingest.docs_path = Some(PathBuf::from(v));
        }
    }

    fn apply_env_secrets(&mut self) {
        let key = std::env::var("LECTERN_CLAUDE_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = key {
            self.secrets.claude_api_key = Some(Secret::new(key));
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.trim().parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}
