//! Keyword-heuristic intent classification.

use crate::command::Command;
use crate::state::PlanningState;

/// The classifier's reading of one user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ClarifyGoal,
    ConfirmPlan,
    FallbackUnknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ClarifyGoal => "clarify_goal",
            Intent::ConfirmPlan => "confirm_plan",
            Intent::FallbackUnknown => "fallback_unknown",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "clarify_goal" => Some(Intent::ClarifyGoal),
            "confirm_plan" => Some(Intent::ConfirmPlan),
            "fallback_unknown" => Some(Intent::FallbackUnknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
}

const CONFIRM_SIGNALS: &[&str] = &[
    "确认",
    "同意",
    "就这样",
    "没问题",
    "可以开始",
    "开始执行",
    "ok",
    "yes",
    "confirm",
];

const CLARIFY_SIGNALS: &[&str] = &[
    "目标",
    "我想",
    "计划",
    "每周",
    "小时",
    "分钟",
    "约束",
    "限制",
    "水平",
    "标准",
    "修改",
    "调整",
    "优化",
    "补充",
];

/// Classify `text` given the session's current state.
///
/// Commands are decisive; otherwise confirm signals outrank clarify
/// signals, and long free text defaults to clarification.
pub fn route(text: &str, state: PlanningState) -> IntentResult {
    if let Some(command) = Command::parse(text) {
        return match command.name.as_str() {
            "goal" => IntentResult {
                intent: Intent::ClarifyGoal,
                confidence: 1.0,
            },
            "confirm" => IntentResult {
                intent: Intent::ConfirmPlan,
                confidence: 1.0,
            },
            _ => IntentResult {
                intent: Intent::FallbackUnknown,
                confidence: 0.7,
            },
        };
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return IntentResult {
            intent: Intent::FallbackUnknown,
            confidence: 0.1,
        };
    }

    if contains_any(trimmed, CONFIRM_SIGNALS) {
        return IntentResult {
            intent: Intent::ConfirmPlan,
            confidence: 0.92,
        };
    }

    if contains_any(trimmed, CLARIFY_SIGNALS) || trimmed.chars().count() >= 8 {
        return IntentResult {
            intent: Intent::ClarifyGoal,
            confidence: 0.78,
        };
    }

    if state == PlanningState::Review {
        return IntentResult {
            intent: Intent::FallbackUnknown,
            confidence: 0.45,
        };
    }

    IntentResult {
        intent: Intent::FallbackUnknown,
        confidence: 0.35,
    }
}

pub(crate) fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lower.contains(&keyword.to_lowercase()))
}
