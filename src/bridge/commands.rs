/// A parsed operator message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    GitStatus,
    GitDiff,
    GitDiffFull,
    /// Empty when the operator gave no message
    GitCommit(String),
    PatchPropose(String),
    PatchApply,
    PatchTest,
    PatchCancel,
    Run { command: String, args: Vec<String> },
    /// Anything not starting with `/`
    FreeText(String),
    Help,
}

impl OperatorCommand {
    /// Parse trimmed operator text; `None` for an empty message
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if !text.starts_with('/') {
            return Some(OperatorCommand::FreeText(text.to_string()));
        }

        let command = match text {
            "/git status" => OperatorCommand::GitStatus,
            "/git diff" => OperatorCommand::GitDiff,
            "/git diff full" => OperatorCommand::GitDiffFull,
            "/git commit" => OperatorCommand::GitCommit(String::new()),
            "/patch" => OperatorCommand::PatchPropose(String::new()),
            "/patch apply" => OperatorCommand::PatchApply,
            "/patch test" => OperatorCommand::PatchTest,
            "/patch cancel" => OperatorCommand::PatchCancel,
            _ => {
                if let Some(message) = text.strip_prefix("/git commit ") {
                    OperatorCommand::GitCommit(message.trim().to_string())
                } else if let Some(instruction) = text.strip_prefix("/patch ") {
                    OperatorCommand::PatchPropose(instruction.trim().to_string())
                } else if let Some(rest) = text.strip_prefix("/run ") {
                    let mut parts = rest.split_whitespace().map(str::to_string);
                    match parts.next() {
                        Some(command) => OperatorCommand::Run {
                            command,
                            args: parts.collect(),
                        },
                        None => OperatorCommand::Help,
                    }
                } else {
                    OperatorCommand::Help
                }
            }
        };

        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(OperatorCommand::parse(""), None);
        assert_eq!(OperatorCommand::parse("   \n"), None);
    }

    #[test]
    fn test_parse_git_commands() {
        assert_eq!(OperatorCommand::parse("/git status"), Some(OperatorCommand::GitStatus));
        assert_eq!(OperatorCommand::parse("/git diff"), Some(OperatorCommand::GitDiff));
        assert_eq!(
            OperatorCommand::parse(" /git diff full "),
            Some(OperatorCommand::GitDiffFull)
        );
        assert_eq!(
            OperatorCommand::parse("/git commit fix: update bot"),
            Some(OperatorCommand::GitCommit("fix: update bot".to_string()))
        );
        assert_eq!(
            OperatorCommand::parse("/git commit"),
            Some(OperatorCommand::GitCommit(String::new()))
        );
    }

    #[test]
    fn test_parse_patch_commands() {
        assert_eq!(OperatorCommand::parse("/patch apply"), Some(OperatorCommand::PatchApply));
        assert_eq!(OperatorCommand::parse("/patch test"), Some(OperatorCommand::PatchTest));
        assert_eq!(OperatorCommand::parse("/patch cancel"), Some(OperatorCommand::PatchCancel));
        assert_eq!(
            OperatorCommand::parse("/patch add a ping endpoint"),
            Some(OperatorCommand::PatchPropose("add a ping endpoint".to_string()))
        );
        assert_eq!(
            OperatorCommand::parse("/patch"),
            Some(OperatorCommand::PatchPropose(String::new()))
        );
    }

    #[test]
    fn test_parse_run() {
        assert_eq!(
            OperatorCommand::parse("/run  npm   test"),
            Some(OperatorCommand::Run {
                command: "npm".to_string(),
                args: vec!["test".to_string()],
            })
        );
        assert_eq!(OperatorCommand::parse("/run"), Some(OperatorCommand::Help));
    }

    #[test]
    fn test_parse_free_text_and_help() {
        assert_eq!(
            OperatorCommand::parse("what should I do next?"),
            Some(OperatorCommand::FreeText("what should I do next?".to_string()))
        );
        assert_eq!(OperatorCommand::parse("/start"), Some(OperatorCommand::Help));
        assert_eq!(OperatorCommand::parse("/git log"), Some(OperatorCommand::Help));
    }
}
