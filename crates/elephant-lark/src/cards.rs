//! Interactive card construction and the inbound card-action taxonomy.

use serde_json::json;

/// A card action tag as reported by an inbound card-callback event, plus
/// any form value that accompanied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardAction {
    PlanReviewApprove,
    PlanReviewRequestChanges,
    ConfirmYes,
    ConfirmNo,
    Other(String),
}

impl CardAction {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "plan_review_approve" => CardAction::PlanReviewApprove,
            "plan_review_request_changes" => CardAction::PlanReviewRequestChanges,
            "confirm_yes" => CardAction::ConfirmYes,
            "confirm_no" => CardAction::ConfirmNo,
            other => CardAction::Other(other.to_string()),
        }
    }

    /// Translate a card action (plus the `plan_feedback` form field, if
    /// present) into the text the gateway should treat as the user's next
    /// inbound input.
    pub fn resolve_user_input(&self, plan_feedback: Option<&str>, generic_value: Option<&str>) -> String {
        match self {
            CardAction::PlanReviewApprove => "OK".to_string(),
            CardAction::PlanReviewRequestChanges => plan_feedback
                .filter(|s| !s.trim().is_empty())
                .map(String::from)
                .unwrap_or_else(|| "需要修改".to_string()),
            CardAction::ConfirmYes => "OK".to_string(),
            CardAction::ConfirmNo => "取消".to_string(),
            CardAction::Other(_) => generic_value.unwrap_or_default().to_string(),
        }
    }
}

/// Build a plan-review card: overall goal, approve button, and a
/// request-changes button with an attached free-text feedback form.
pub fn plan_review_card(overall_goal_ui: &str) -> serde_json::Value {
    json!({
        "config": { "wide_screen_mode": true },
        "header": { "title": { "tag": "plain_text", "content": "计划待确认" } },
        "elements": [
            { "tag": "div", "text": { "tag": "lark_md", "content": overall_goal_ui } },
            {
                "tag": "form",
                "name": "plan_review_form",
                "elements": [
                    {
                        "tag": "input",
                        "name": "plan_feedback",
                        "placeholder": { "tag": "plain_text", "content": "修改意见（可选）" }
                    },
                    {
                        "tag": "action",
                        "actions": [
                            {
                                "tag": "button",
                                "text": { "tag": "plain_text", "content": "通过" },
                                "type": "primary",
                                "value": { "action": "plan_review_approve" }
                            },
                            {
                                "tag": "button",
                                "text": { "tag": "plain_text", "content": "需要修改" },
                                "type": "default",
                                "value": { "action": "plan_review_request_changes" }
                            }
                        ]
                    }
                ]
            }
        ]
    })
}

/// Build a results card summarizing a completed task.
pub fn results_card(content: &str) -> serde_json::Value {
    json!({
        "config": { "wide_screen_mode": true },
        "header": { "title": { "tag": "plain_text", "content": "结果" } },
        "elements": [
            { "tag": "div", "text": { "tag": "lark_md", "content": content } }
        ]
    })
}

/// Build an error card.
pub fn error_card(message: &str) -> serde_json::Value {
    json!({
        "config": { "wide_screen_mode": true },
        "header": {
            "title": { "tag": "plain_text", "content": "执行失败" },
            "template": "red"
        },
        "elements": [
            { "tag": "div", "text": { "tag": "lark_md", "content": message } }
        ]
    })
}

/// Build a yes/no confirmation card.
pub fn confirm_card(prompt: &str) -> serde_json::Value {
    json!({
        "config": { "wide_screen_mode": true },
        "elements": [
            { "tag": "div", "text": { "tag": "lark_md", "content": prompt } },
            {
                "tag": "action",
                "actions": [
                    {
                        "tag": "button",
                        "text": { "tag": "plain_text", "content": "确认" },
                        "type": "primary",
                        "value": { "action": "confirm_yes" }
                    },
                    {
                        "tag": "button",
                        "text": { "tag": "plain_text", "content": "取消" },
                        "type": "danger",
                        "value": { "action": "confirm_no" }
                    }
                ]
            }
        ]
    })
}
