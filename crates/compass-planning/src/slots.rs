//! Slot-completion tracking for the clarification dialogue.
//!
//! Six pieces of information are elicited from free text with keyword and
//! regex heuristics. Completion only ever moves forward: once a slot is
//! filled it stays filled for the lifetime of the session.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::intent::contains_any;

const MAX_FOLLOW_UP_PER_TURN: usize = 2;

static RE_TIME_BUDGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\s*(小时|h|hr|分钟|min)").expect("time budget pattern")
});
static RE_SUCCESS_HINTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\s*条|三条|四条|五条|[1-5][.、])").expect("success hints pattern")
});

/// One of the six named pieces of information the dialogue elicits,
/// in the canonical follow-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    MainGoal,
    SuccessCriteria,
    CurrentLevel,
    TimeBudget,
    Constraints,
    RiskFlags,
}

pub const SLOT_ORDER: [Slot; 6] = [
    Slot::MainGoal,
    Slot::SuccessCriteria,
    Slot::CurrentLevel,
    Slot::TimeBudget,
    Slot::Constraints,
    Slot::RiskFlags,
];

impl Slot {
    pub fn key(self) -> &'static str {
        match self {
            Slot::MainGoal => "main_goal",
            Slot::SuccessCriteria => "success_criteria",
            Slot::CurrentLevel => "current_level",
            Slot::TimeBudget => "time_budget",
            Slot::Constraints => "constraints",
            Slot::RiskFlags => "risk_flags",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Slot::MainGoal => "主目标",
            Slot::SuccessCriteria => "成功标准",
            Slot::CurrentLevel => "当前水平",
            Slot::TimeBudget => "时间预算",
            Slot::Constraints => "约束条件",
            Slot::RiskFlags => "风险项",
        }
    }

    pub fn follow_up_question(self) -> &'static str {
        match self {
            Slot::MainGoal => "你希望在什么时间前达成什么主目标？",
            Slot::SuccessCriteria => "请给我 3-5 条可验收的成功标准（尽量量化）。",
            Slot::CurrentLevel => "你当前水平如何（零基础/入门/有项目经验）？",
            Slot::TimeBudget => "你每周可投入多少小时，或有哪些固定学习时段？",
            Slot::Constraints => "有哪些约束会影响执行（如加班、设备、可用时段）？",
            Slot::RiskFlags => "你担心哪些风险会影响坚持（如出差、拖延、突发事务）？",
        }
    }
}

/// Completion map over the six slots.
///
/// Deserialisation is the normalisation step: unknown keys are dropped and
/// missing keys default to `false`, so any value read back from storage is
/// already in canonical shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCompletion {
    #[serde(default)]
    pub main_goal: bool,
    #[serde(default)]
    pub success_criteria: bool,
    #[serde(default)]
    pub current_level: bool,
    #[serde(default)]
    pub time_budget: bool,
    #[serde(default)]
    pub constraints: bool,
    #[serde(default)]
    pub risk_flags: bool,
}

impl SlotCompletion {
    pub fn get(&self, slot: Slot) -> bool {
        match slot {
            Slot::MainGoal => self.main_goal,
            Slot::SuccessCriteria => self.success_criteria,
            Slot::CurrentLevel => self.current_level,
            Slot::TimeBudget => self.time_budget,
            Slot::Constraints => self.constraints,
            Slot::RiskFlags => self.risk_flags,
        }
    }

    pub fn set(&mut self, slot: Slot, value: bool) {
        match slot {
            Slot::MainGoal => self.main_goal = value,
            Slot::SuccessCriteria => self.success_criteria = value,
            Slot::CurrentLevel => self.current_level = value,
            Slot::TimeBudget => self.time_budget = value,
            Slot::Constraints => self.constraints = value,
            Slot::RiskFlags => self.risk_flags = value,
        }
    }

    /// Slots still missing, in canonical order.
    pub fn missing(&self) -> Vec<Slot> {
        SLOT_ORDER
            .iter()
            .copied()
            .filter(|slot| !self.get(*slot))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        SLOT_ORDER.iter().all(|slot| self.get(*slot))
    }

    pub fn filled_count(&self) -> usize {
        SLOT_ORDER.iter().filter(|slot| self.get(**slot)).count()
    }

    /// Fold one user message into the map. Filled slots are never cleared;
    /// commands carry no slot information and leave the map untouched.
    pub fn absorb(&self, text: &str) -> SlotCompletion {
        let mut next = *self;

        let trimmed = text.trim();
        if trimmed.is_empty() || Command::parse(trimmed).is_some() {
            return next;
        }

        if detect_main_goal(trimmed) {
            next.main_goal = true;
        }
        if detect_success_criteria(trimmed) {
            next.success_criteria = true;
        }
        if detect_current_level(trimmed) {
            next.current_level = true;
        }
        if detect_time_budget(trimmed) {
            next.time_budget = true;
        }
        if detect_constraints(trimmed) {
            next.constraints = true;
        }
        // Constraints imply something can go wrong, so they count as a
        // risk signal too.
        if detect_risk_flags(trimmed) || next.constraints {
            next.risk_flags = true;
        }

        next
    }

    /// Lenient decode for the storage column; malformed JSON resets to the
    /// all-false default rather than failing the read.
    pub fn from_json(raw: &str) -> SlotCompletion {
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Canned questions for the first `limit` missing slots (at most two per
/// turn regardless of `limit`).
pub fn build_follow_up(missing: &[Slot], limit: usize) -> Vec<&'static str> {
    let limit = limit.min(MAX_FOLLOW_UP_PER_TURN);
    missing
        .iter()
        .take(limit)
        .map(|slot| slot.follow_up_question())
        .collect()
}

/// Numbered question list, e.g. "我先补齐关键信息：\n1) …\n2) …".
pub fn format_follow_up(questions: &[&str]) -> String {
    if questions.is_empty() {
        return String::new();
    }

    let mut out = String::from("我先补齐关键信息：");
    for (i, question) in questions.iter().enumerate() {
        out.push_str(&format!("\n{}) {}", i + 1, question));
    }
    out
}

/// Progress recap appended on the summary cadence and when entering review.
pub fn progress_summary(slots: &SlotCompletion) -> String {
    let filled: Vec<&str> = SLOT_ORDER
        .iter()
        .filter(|slot| slots.get(**slot))
        .map(|slot| slot.label())
        .collect();
    let missing: Vec<&str> = SLOT_ORDER
        .iter()
        .filter(|slot| !slots.get(**slot))
        .map(|slot| slot.label())
        .collect();

    let filled_text = if filled.is_empty() {
        "无".to_string()
    } else {
        filled.join("、")
    };
    let missing_text = if missing.is_empty() {
        "无".to_string()
    } else {
        missing.join("、")
    };

    format!(
        "【当前摘要】已补齐 {}/{} 项：{}；待补齐：{}。\n当前版本你是否满意，还是继续优化？",
        slots.filled_count(),
        SLOT_ORDER.len(),
        filled_text,
        missing_text,
    )
}

fn detect_main_goal(text: &str) -> bool {
    if text.chars().count() < 6 {
        return false;
    }
    contains_any(
        text,
        &["目标", "我想", "希望", "计划", "完成", "学会", "掌握", "通过", "提升"],
    )
}

fn detect_success_criteria(text: &str) -> bool {
    if RE_SUCCESS_HINTS.is_match(text) {
        return true;
    }
    contains_any(text, &["成功标准", "验收", "里程碑", "达到", "完成", "通过"])
}

fn detect_current_level(text: &str) -> bool {
    contains_any(
        text,
        &[
            "零基础", "新手", "入门", "初级", "中级", "高级", "不会", "有经验", "做过项目",
            "基础薄弱",
        ],
    )
}

fn detect_time_budget(text: &str) -> bool {
    if RE_TIME_BUDGET.is_match(text) {
        return true;
    }
    contains_any(
        text,
        &["每周", "每天", "工作日", "周末", "晚上", "早上", "午休", "通勤"],
    )
}

fn detect_constraints(text: &str) -> bool {
    contains_any(
        text,
        &[
            "只能", "没时间", "限制", "约束", "加班", "带娃", "出差", "设备", "网络",
            "时间不固定",
        ],
    )
}

fn detect_risk_flags(text: &str) -> bool {
    contains_any(
        text,
        &[
            "风险", "担心", "拖延", "中断", "坚持不下去", "突发", "不稳定", "焦虑", "压力",
        ],
    )
}
