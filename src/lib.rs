pub mod catalog;
pub mod datum;
pub mod db;
pub mod execution;
pub mod expr;
pub mod index;
pub mod record;
pub mod sql;
pub mod storage;
pub mod table;

pub use db::{Database, KizunaError, SelectResult, StatementResult};

#[cfg(test)]
pub(crate) mod test_util {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    use std::path::PathBuf;

    pub fn temp_path(prefix: &str) -> PathBuf {
        let tag: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        std::env::temp_dir().join(format!("kizuna_{}_{}.kz", prefix, tag))
    }

    pub fn temp_dir(prefix: &str) -> PathBuf {
        let tag: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        let dir = std::env::temp_dir().join(format!("kizuna_{}_{}", prefix, tag));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
