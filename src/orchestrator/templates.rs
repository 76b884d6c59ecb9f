//! 任务模板：Command → JobSubmission
//!
//! 内置模板为 YAML（templates/*.yaml），占位符 `${IMAGE_URL}` / `${CLASS_NAME}` / `${TEXT}`
//! 只在解析后的字符串叶子上替换，用户输入不会改变任务结构。
//! RunJobFile 使用用户链接的任务文件（YAML 或 JSON），原样提交。

use std::collections::HashMap;

use serde_json::Value;

use crate::command::{Command, CommandKind};
use crate::core::BotError;
use crate::dispatch::{JobSubmission, WaitPolicy};
use crate::orchestrator::job_file::parse_job_file;

const CLASSIFY: &str = include_str!("../../templates/classify.yaml");
const HOTDOG: &str = include_str!("../../templates/hotdog.yaml");
const ARBITRARY_CLASS: &str = include_str!("../../templates/arbitrary_class.yaml");
const ALT_TEXT: &str = include_str!("../../templates/alt_text.yaml");
const COMMUNITY: &str = include_str!("../../templates/community.yaml");

/// 构建模板需要的外部输入（由通知循环准备）
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateInputs<'a> {
    /// mention 或其父帖 / 引用帖中的第一张图
    pub image_url: Option<&'a str>,
    /// RunJobFile 已下载的任务文件内容
    pub job_file: Option<&'a str>,
}

pub struct JobTemplateBuilder {
    templates: HashMap<CommandKind, Value>,
    wait: WaitPolicy,
}

impl JobTemplateBuilder {
    pub fn new(wait: WaitPolicy) -> Result<Self, BotError> {
        let mut templates = HashMap::new();
        for (kind, raw) in [
            (CommandKind::ClassifyImage, CLASSIFY),
            (CommandKind::DetectHotdog, HOTDOG),
            (CommandKind::DetectArbitraryClass, ARBITRARY_CLASS),
            (CommandKind::GenerateAltText, ALT_TEXT),
            (CommandKind::CommunityJob, COMMUNITY),
        ] {
            let job = parse_job_file(raw)
                .map_err(|e| BotError::Template(format!("built-in {} template: {}", kind, e)))?;
            templates.insert(kind, job);
        }
        Ok(Self { templates, wait })
    }

    pub fn build(&self, command: &Command, inputs: &TemplateInputs<'_>) -> Result<JobSubmission, BotError> {
        let job = match command.kind {
            CommandKind::None => {
                return Err(BotError::Template("nothing to run for an unrecognized mention".to_string()))
            }
            CommandKind::RunJobFile => {
                let raw = inputs
                    .job_file
                    .ok_or_else(|| BotError::Template("no job file was fetched".to_string()))?;
                parse_job_file(raw)?
            }
            kind => {
                if kind.needs_image() && inputs.image_url.is_none() {
                    return Err(BotError::Template(format!("{} needs an image", kind)));
                }
                let mut job = self
                    .templates
                    .get(&kind)
                    .cloned()
                    .ok_or_else(|| BotError::Template(format!("no template for {}", kind)))?;
                let vars = [
                    ("${IMAGE_URL}", inputs.image_url.unwrap_or_default()),
                    ("${CLASS_NAME}", command.params.class_name.as_deref().unwrap_or_default()),
                    ("${TEXT}", command.params.text.as_deref().unwrap_or_default()),
                ];
                substitute(&mut job, &vars);
                job
            }
        };

        let payload = serde_json::to_vec(&serde_json::json!({ "Job": job }))
            .map_err(|e| BotError::Template(e.to_string()))?;

        Ok(JobSubmission {
            payload,
            wait_secs: self.wait.wait_for(command.kind),
            graceful_stop: matches!(command.kind, CommandKind::RunJobFile | CommandKind::CommunityJob),
            kind: command.kind,
        })
    }
}

/// 在所有字符串叶子上替换占位符
fn substitute(value: &mut Value, vars: &[(&str, &str)]) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                for (placeholder, replacement) in vars {
                    if s.contains(placeholder) {
                        *s = s.replace(placeholder, replacement);
                    }
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, vars)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, vars)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandParams;

    fn builder() -> JobTemplateBuilder {
        JobTemplateBuilder::new(WaitPolicy::from_section(&Default::default())).unwrap()
    }

    fn decode(sub: &JobSubmission) -> Value {
        serde_json::from_slice(&sub.payload).unwrap()
    }

    #[test]
    fn test_builtin_templates_parse() {
        let b = builder();
        assert_eq!(b.templates.len(), 5);
    }

    #[test]
    fn test_arbitrary_class_substitution() {
        let cmd = Command {
            kind: CommandKind::DetectArbitraryClass,
            params: CommandParams {
                class_name: Some("cat".to_string()),
                ..Default::default()
            },
        };
        let inputs = TemplateInputs {
            image_url: Some("https://cdn.example/img.jpg"),
            ..Default::default()
        };
        let sub = builder().build(&cmd, &inputs).unwrap();
        let job = decode(&sub);
        let params = &job["Job"]["Tasks"][0]["Engine"]["Params"]["Parameters"];
        assert_eq!(params[1], "https://cdn.example/img.jpg");
        assert_eq!(params[3], "cat");
        assert_eq!(sub.wait_secs, 30);
        assert!(!sub.graceful_stop);
    }

    #[test]
    fn test_substitution_keeps_structure() {
        let cmd = Command {
            kind: CommandKind::CommunityJob,
            params: CommandParams {
                text: Some("x\"\n  Type: evil".to_string()),
                ..Default::default()
            },
        };
        let sub = builder().build(&cmd, &TemplateInputs::default()).unwrap();
        let job = decode(&sub);
        assert_eq!(job["Job"]["Tasks"][0]["Engine"]["Params"]["Parameters"][1], "x\"\n  Type: evil");
        assert_eq!(job["Job"]["Type"], "batch");
        assert_eq!(sub.wait_secs, 20);
        assert!(sub.graceful_stop);
    }

    #[test]
    fn test_image_required() {
        let cmd = Command::new(CommandKind::DetectHotdog);
        let err = builder().build(&cmd, &TemplateInputs::default()).unwrap_err();
        assert!(matches!(err, BotError::Template(_)));
    }

    #[test]
    fn test_alt_text_uses_override_wait() {
        let cmd = Command::new(CommandKind::GenerateAltText);
        let inputs = TemplateInputs {
            image_url: Some("https://cdn.example/a.png"),
            ..Default::default()
        };
        let sub = builder().build(&cmd, &inputs).unwrap();
        assert_eq!(sub.wait_secs, 10);
        assert_eq!(sub.kind, CommandKind::GenerateAltText);
    }

    #[test]
    fn test_run_job_file_is_wrapped() {
        let cmd = Command::new(CommandKind::RunJobFile);
        let inputs = TemplateInputs {
            job_file: Some("Name: hello\nType: batch\nCount: 1\n"),
            ..Default::default()
        };
        let sub = builder().build(&cmd, &inputs).unwrap();
        let job = decode(&sub);
        assert_eq!(job["Job"]["Name"], "hello");
        assert!(sub.graceful_stop);
    }

    #[test]
    fn test_none_has_no_template() {
        assert!(builder().build(&Command::none(), &TemplateInputs::default()).is_err());
    }
}
