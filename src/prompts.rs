//! Prompt set construction and per-request model selection

use crate::error::{BenchError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use tracing::{debug, info};

/// Returns exactly `n` items from `seq`, truncating or repeating it cyclically.
///
/// For `n > seq.len()` item `i` of the result is `seq[i % seq.len()]`.
/// An empty `seq` is only accepted when `n == 0`.
pub fn generate_n<T: Clone>(seq: &[T], n: usize) -> Result<Vec<T>> {
    if n <= seq.len() {
        return Ok(seq[..n].to_vec());
    }
    if seq.is_empty() {
        return Err(BenchError::InvalidInput(format!(
            "cannot generate {} items from an empty sequence",
            n
        )));
    }

    let n_seq: Vec<T> = seq.iter().cycle().take(n).cloned().collect();
    debug_assert_eq!(n_seq.len(), n);
    Ok(n_seq)
}

/// Load prompts from a file, one per line. Lines are trimmed and blank lines dropped.
pub async fn load_prompts_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    ensure_file_exists(path).await?;

    info!("Loading prompts from: {}", path.display());
    let content = tokio::fs::read_to_string(path).await?;

    let total_lines = content.lines().count();
    let prompts: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let skipped = total_lines - prompts.len();
    if skipped > 0 {
        debug!(skipped, path = %path.display(), "Skipped blank prompt lines");
    }
    info!("Loaded {} prompts", prompts.len());
    Ok(prompts)
}

/// Load a system prompt to prepend to every prompt.
pub async fn load_system_prompt(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    ensure_file_exists(path).await?;
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content.trim().to_string())
}

async fn ensure_file_exists(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(BenchError::Config(format!(
            "{} is not a regular file",
            path.display()
        ))),
        Err(_) => Err(BenchError::Config(format!(
            "The file {} does not exist!",
            path.display()
        ))),
    }
}

/// Prefix every prompt with `system`, separated by a newline.
pub fn with_system_prompt(prompts: Vec<String>, system: &str) -> Vec<String> {
    if system.is_empty() {
        return prompts;
    }
    prompts
        .into_iter()
        .map(|p| format!("{}\n{}", system, p))
        .collect()
}

/// Resolve the prompt set for a run: optionally cycle to `num_requests`.
///
/// `None` sends every prompt once.
pub fn build_prompt_set(prompts: Vec<String>, num_requests: Option<usize>) -> Result<Vec<String>> {
    match num_requests {
        None => Ok(prompts),
        Some(n) if n > 0 && prompts.is_empty() => Err(BenchError::Config(format!(
            "{} requests requested but the prompt set is empty",
            n
        ))),
        Some(n) => generate_n(&prompts, n),
    }
}

/// Pick the model for one request: the first model, or a random one.
pub fn choose_model<'a, R: Rng + ?Sized>(
    models: &'a [String],
    randomize: bool,
    rng: &mut R,
) -> Result<&'a str> {
    let model = if randomize {
        models.choose(rng)
    } else {
        models.first()
    };
    model
        .map(String::as_str)
        .ok_or_else(|| BenchError::Config("at least one model name is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn letters() -> Vec<&'static str> {
        vec!["a", "b", "c"]
    }

    #[test]
    fn test_generate_n_truncates() {
        assert_eq!(generate_n(&letters(), 2).unwrap(), vec!["a", "b"]);
        assert_eq!(generate_n(&letters(), 3).unwrap(), letters());
    }

    #[test]
    fn test_generate_n_zero() {
        assert!(generate_n(&letters(), 0).unwrap().is_empty());
        let empty: Vec<&str> = Vec::new();
        assert!(generate_n(&empty, 0).unwrap().is_empty());
    }

    #[test]
    fn test_generate_n_cycles_non_multiple() {
        let seq = letters();
        for n in [4, 6, 7, 11] {
            let out = generate_n(&seq, n).unwrap();
            assert_eq!(out.len(), n);
            for (i, item) in out.iter().enumerate() {
                assert_eq!(*item, seq[i % seq.len()]);
            }
        }
    }

    #[test]
    fn test_generate_n_empty_sequence_rejected() {
        let empty: Vec<String> = Vec::new();
        let err = generate_n(&empty, 3).unwrap_err();
        assert!(matches!(err, BenchError::InvalidInput(_)));
    }

    #[test]
    fn test_build_prompt_set() {
        let prompts = vec!["x".to_string(), "y".to_string()];
        assert_eq!(build_prompt_set(prompts.clone(), None).unwrap(), prompts);
        assert_eq!(build_prompt_set(prompts, Some(3)).unwrap(), vec!["x", "y", "x"]);
        assert!(matches!(
            build_prompt_set(Vec::new(), Some(1)),
            Err(BenchError::Config(_))
        ));
        assert!(build_prompt_set(Vec::new(), Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_with_system_prompt() {
        let out = with_system_prompt(vec!["hi".to_string()], "Be brief.");
        assert_eq!(out, vec!["Be brief.\nhi"]);
        let unchanged = with_system_prompt(vec!["hi".to_string()], "");
        assert_eq!(unchanged, vec!["hi"]);
    }

    #[test]
    fn test_choose_model_fixed_and_random() {
        let models = vec!["llama3".to_string(), "mistral".to_string()];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..10 {
            assert_eq!(choose_model(&models, false, &mut rng).unwrap(), "llama3");
        }

        let picked: Vec<&str> = (0..50)
            .map(|_| choose_model(&models, true, &mut rng).unwrap())
            .collect();
        assert!(picked.iter().all(|m| models.iter().any(|x| x == m)));
        assert!(picked.contains(&"mistral"));

        assert!(choose_model(&[], true, &mut rng).is_err());
    }

    #[tokio::test]
    async fn test_load_prompts_file_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  first prompt  ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "second prompt").unwrap();

        let prompts = load_prompts_file(file.path()).await.unwrap();
        assert_eq!(prompts, vec!["first prompt", "second prompt"]);
    }

    #[tokio::test]
    async fn test_load_prompts_missing_file_is_config_error() {
        let err = load_prompts_file("/definitely/not/here.txt").await.unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
