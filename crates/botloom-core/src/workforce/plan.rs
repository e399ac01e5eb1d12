//! Planning: turn a request into roles and tasks.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::GENERAL_AGENT;
use crate::reasoner::strip_code_fence;

pub const PLANNER_PROMPT: &str = r#"You are the planner of a small team of AI agents.
Split the user's request into distinct roles and give each role one task.
Reply with exactly one JSON object and nothing else:

{"roles": [{"name": "<role name>", "description": "<what it does>"}],
 "tasks": [{"role": "<role name>", "task": "<what it must do>"}]}

Use at most {max} roles. Roles can later ask for more collaborators."#;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRole {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub task: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub roles: Vec<PlannedRole>,
    /// Whether this is the single-role fallback.
    pub fallback: bool,
}

impl Plan {
    pub fn general(request: &str) -> Self {
        Self {
            roles: vec![PlannedRole {
                name: GENERAL_AGENT.to_string(),
                description: None,
                task: request.to_string(),
            }],
            fallback: true,
        }
    }
}

pub fn planner_prompt(max_agents: usize) -> String {
    PLANNER_PROMPT.replace("{max}", &max_agents.to_string())
}

fn json_object_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// Parse planner output. Accepts a fenced or bare JSON object, or the first
/// `{...}` span inside surrounding prose. Roles may be strings or objects;
/// tasks may be a list of `{role, task}` or a `role → task` map. Roles
/// without a task get the whole request. Returns `None` when no role can be
/// recovered.
pub fn parse_plan(text: &str, request: &str, max_agents: usize) -> Option<Plan> {
    let max_agents = max_agents.max(1);
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body).ok().or_else(|| {
        json_object_re()?
            .find(body)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    })?;

    let obj = value.as_object()?;
    let mut roles: Vec<PlannedRole> = Vec::new();

    for item in obj.get("roles")?.as_array()? {
        let (name, description) = match item {
            Value::String(s) => (s.trim().to_string(), None),
            Value::Object(o) => (
                o.get("name")
                    .or_else(|| o.get("role"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                o.get("description").and_then(|v| v.as_str()).map(str::to_string),
            ),
            _ => continue,
        };
        if name.is_empty() || roles.iter().any(|r| r.name.eq_ignore_ascii_case(&name)) {
            continue;
        }
        roles.push(PlannedRole {
            name,
            description,
            task: String::new(),
        });
        if roles.len() == max_agents {
            break;
        }
    }

    if roles.is_empty() {
        return None;
    }

    let mut assign = |role: &str, task: &str| {
        if let Some(r) = roles
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(role.trim()))
        {
            if r.task.is_empty() {
                r.task = task.to_string();
            }
        }
    };

    match obj.get("tasks") {
        Some(Value::Array(items)) => {
            for item in items {
                let role = item.get("role").and_then(|v| v.as_str());
                let task = item
                    .get("task")
                    .or_else(|| item.get("description"))
                    .and_then(|v| v.as_str());
                if let (Some(role), Some(task)) = (role, task) {
                    assign(role, task);
                }
            }
        }
        Some(Value::Object(map)) => {
            for (role, task) in map {
                if let Some(task) = task.as_str() {
                    assign(role, task);
                }
            }
        }
        _ => {}
    }

    for role in &mut roles {
        if role.task.is_empty() {
            role.task = request.to_string();
        }
    }

    Some(Plan {
        roles,
        fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_plan() {
        let text = r#"```json
{"roles": [{"name": "Researcher"}, {"name": "Writer", "description": "prose"}],
 "tasks": [{"role": "researcher", "task": "find sources"}]}
```"#;
        let plan = parse_plan(text, "write a report", 5).unwrap();
        assert!(!plan.fallback);
        assert_eq!(plan.roles.len(), 2);
        assert_eq!(plan.roles[0].task, "find sources");
        assert_eq!(plan.roles[1].task, "write a report");
        assert_eq!(plan.roles[1].description.as_deref(), Some("prose"));
    }

    #[test]
    fn test_parse_plan_in_prose_with_task_map() {
        let text = r#"Sure! Here is the plan: {"roles": ["A", "B", "a"], "tasks": {"B": "do b"}} Good luck."#;
        let plan = parse_plan(text, "req", 5).unwrap();
        let names: Vec<_> = plan.roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(plan.roles[1].task, "do b");
    }

    #[test]
    fn test_roles_capped() {
        let text = r#"{"roles": ["A", "B", "C", "D"]}"#;
        assert_eq!(parse_plan(text, "req", 2).unwrap().roles.len(), 2);
    }

    #[test]
    fn test_unparseable_plans() {
        assert!(parse_plan("no json here", "req", 5).is_none());
        assert!(parse_plan(r#"{"roles": []}"#, "req", 5).is_none());
        assert!(parse_plan(r#"{"tasks": []}"#, "req", 5).is_none());
    }

    #[test]
    fn test_general_plan() {
        let plan = Plan::general("do everything");
        assert!(plan.fallback);
        assert_eq!(plan.roles[0].name, GENERAL_AGENT);
        assert_eq!(plan.roles[0].task, "do everything");
    }
}
