//! Canonical reply texts. These literals are part of the bot's behavioural
//! contract and are asserted verbatim by the dialogue tests.

pub const REPLY_START: &str =
    "你好，我是 Compass。你可以通过 /goal 开始目标澄清，我会一步步帮你把目标讲清楚。";

pub const REPLY_START_BACK: &str =
    "欢迎回来。你可以发送 /goal 继续目标澄清，或直接用自然语言描述你的目标。";

pub const REPLY_GOAL: &str =
    "好的，我们开始目标澄清。请先告诉我：你希望在什么时间前达成什么目标？";

pub const REPLY_HELP: &str =
    "当前可用命令：/start、/goal、/help。你也可以直接用自然语言告诉我你的目标。";

pub const REPLY_NON_TEXT: &str = "我目前只能处理文本消息，请发送文字内容。";

pub const REPLY_UNKNOWN_COMMAND: &str =
    "这个命令会在后续里程碑开放。当前可用：/start、/goal、/help。";

pub const REPLY_NATURAL_MESSAGE: &str =
    "收到，我已进入自然语言澄清入口。你可以继续描述目标细节，或发送 /goal 切换到命令入口。";

pub const REPLY_REVIEW_READY: &str =
    "关键信息已补齐，我们进入 review 阶段。请检查下面的摘要：发送“确认”或 /confirm 定稿，也可以继续补充修改。";

pub const REPLY_PLAN_CONFIRMED: &str =
    "计划已定稿（confirmed）。目标澄清到此完成，后续里程碑会开放计划执行与提醒。";

pub const REPLY_FALLBACK_GUIDANCE: &str =
    "我暂时没有读懂这句话。你可以补充目标、时间或约束等细节，也可以发送 /help 查看可用命令。";

pub const REPLY_REVIEW_FALLBACK: &str =
    "当前处于 review 阶段：发送“确认”定稿，或直接说明需要修改的内容。";

pub const REPLY_SESSION_TIMEOUT: &str =
    "距离上次对话已超过 24 小时，我已把会话重置回澄清阶段，我们从当前进度继续。";

/// Marker prefix of the progress summary; used to avoid appending a second
/// summary to a reply that already carries one.
pub const SUMMARY_MARKER: &str = "【当前摘要】";

/// Acknowledgement when a review-stage message asks for changes.
pub const REVIEW_MODIFY_ACK: &str = "已收到修改意见，我已切回 clarifying.";

/// Acknowledgement when a confirmed plan is reopened for clarification.
pub const CONFIRMED_REOPEN_ACK: &str = "我已重新打开澄清会话.";
