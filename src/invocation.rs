/// The command a watchdog instance monitors, and how it will be monitored.
use crate::config::SchedulerConfig;
use std::path::{Path, PathBuf};

/// Which completion strategy an invocation calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Arbitrary shell command: run it, capture output, wait for exit.
    Direct { command: String },
    /// Batch submission: submit, extract the job id, poll the queue.
    Scheduler {
        command: String,
        script: Option<PathBuf>,
    },
}

impl Invocation {
    /// Classify a serialised command string.
    ///
    /// Scheduler mode is chosen when the first word names the configured
    /// submit command (compared by file name, so `/usr/bin/sbatch` counts).
    pub fn classify(command: &str, scheduler: &SchedulerConfig) -> Self {
        let words = split_words(command);
        let is_submit = words
            .first()
            .and_then(|w| Path::new(w).file_name())
            .is_some_and(|name| name == scheduler.submit_command.as_str());

        if is_submit {
            Invocation::Scheduler {
                command: command.to_string(),
                script: find_script(&words[1..]),
            }
        } else {
            Invocation::Direct {
                command: command.to_string(),
            }
        }
    }

    pub fn command(&self) -> &str {
        match self {
            Invocation::Direct { command } => command,
            Invocation::Scheduler { command, .. } => command,
        }
    }
}

/// First non-option word that exists as a regular file.
fn find_script(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .filter(|a| !a.starts_with('-'))
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Join command-line tokens into one string a POSIX shell will split back
/// into the same tokens.
///
/// A single token is returned verbatim: it is already a full command string
/// (`watchdog "make && make test"`).
pub fn serialize_tokens(tokens: &[String]) -> String {
    if let [only] = tokens {
        return only.clone();
    }
    tokens
        .iter()
        .map(|t| quote_word(t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_word(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Split a command string into words using shell quoting rules
/// (single quotes, double quotes, backslash escapes).
///
/// No expansion is performed.
pub fn split_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(q),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(e) = chars.next() {
                    current.push(e);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_serialize_plain_tokens() {
        assert_eq!(
            serialize_tokens(&tokens(&["python", "train.py", "--epochs=10"])),
            "python train.py --epochs=10"
        );
    }

    #[test]
    fn test_serialize_single_token_verbatim() {
        assert_eq!(
            serialize_tokens(&tokens(&["make && make test"])),
            "make && make test"
        );
    }

    #[test]
    fn test_serialize_quotes_whitespace_and_metachars() {
        assert_eq!(
            serialize_tokens(&tokens(&["echo", "a  b", "x;y", ""])),
            "echo 'a  b' 'x;y' ''"
        );
    }

    #[test]
    fn test_serialize_escapes_single_quote() {
        assert_eq!(
            serialize_tokens(&tokens(&["echo", "it's"])),
            r"echo 'it'\''s'"
        );
    }

    #[test]
    fn test_serialize_then_split_preserves_tokens() {
        let original = tokens(&["printf", "%s\n", "it's \"quoted\"", "  spaced  ", "$HOME"]);
        let line = serialize_tokens(&original);
        assert_eq!(split_words(&line), original);
    }

    #[test]
    fn test_split_words_mixed_quoting() {
        assert_eq!(
            split_words(r#"sbatch --job-name="my job" run\ me.sh 'a b'"#),
            tokens(&["sbatch", "--job-name=my job", "run me.sh", "a b"])
        );
    }

    #[test]
    fn test_split_words_empty_quotes_are_words() {
        assert_eq!(split_words("echo '' x"), tokens(&["echo", "", "x"]));
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn test_classify_direct() {
        let inv = Invocation::classify("echo hello", &SchedulerConfig::default());
        assert_eq!(
            inv,
            Invocation::Direct {
                command: "echo hello".to_string()
            }
        );
    }

    #[test]
    fn test_classify_scheduler_finds_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "#!/bin/bash\n").unwrap();

        let command = format!("/usr/bin/sbatch -p gpu {}", script.display());
        let inv = Invocation::classify(&command, &SchedulerConfig::default());
        assert_eq!(
            inv,
            Invocation::Scheduler {
                command: command.clone(),
                script: Some(script),
            }
        );
        assert_eq!(inv.command(), command);
    }

    #[test]
    fn test_classify_scheduler_missing_script() {
        let inv = Invocation::classify("sbatch /nonexistent/job.sh", &SchedulerConfig::default());
        assert!(matches!(inv, Invocation::Scheduler { script: None, .. }));
    }

    #[test]
    fn test_classify_submit_name_must_match_exactly() {
        let inv = Invocation::classify("sbatch-helper job.sh", &SchedulerConfig::default());
        assert!(matches!(inv, Invocation::Direct { .. }));
    }
}
