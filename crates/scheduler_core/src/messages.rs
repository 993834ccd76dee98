//! crates/scheduler_core/src/messages.rs
//!
//! User-facing message copy. Every function here is a pure transform from
//! data to the text that ends up in a WhatsApp message.

use std::fmt::{self, Write};

use crate::domain::SilentSession;

/// Most items listed in any message before the remainder is summarised.
pub const MAX_LISTED_ITEMS: usize = 5;

/// Sent when a silent-mode summary cannot be built.
pub const SILENT_SUMMARY_FALLBACK: &str = "🔕 Silent mode has ended. Welcome back!";

pub const TASK_CREATION_FAILED: &str =
    "⚠️ I tried to create a scheduled task for you, but something went wrong.";

pub const PROMPT_FAILED: &str = "⚠️ I tried to run your scheduled AI action, but an error occurred.";

const SILENT_ITEM_MAX_CHARS: usize = 80;

/// How many items a message talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountBucket {
    None,
    One,
    Few,
    Many,
}

impl CountBucket {
    pub fn of(count: usize) -> Self {
        match count {
            0 => CountBucket::None,
            1 => CountBucket::One,
            2..=3 => CountBucket::Few,
            _ => CountBucket::Many,
        }
    }
}

pub fn reminder(title: &str) -> String {
    format!("🔔 Reminder: {}", title)
}

pub fn task_created(title: &str) -> String {
    format!("✅ I've just created your scheduled task: '{}'", title)
}

pub fn prompt_response(text: &str) -> String {
    format!("🤖 Here is your scheduled AI response:\n\n{}", text.trim())
}

/// A numbered list of at most five items, followed by "...and N more!" when
/// items were left out.
pub fn numbered_list<S: AsRef<str>>(items: &[S]) -> String {
    let mut lines: Vec<String> = items
        .iter()
        .take(MAX_LISTED_ITEMS)
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect();
    if items.len() > MAX_LISTED_ITEMS {
        lines.push(format!("...and {} more!", items.len() - MAX_LISTED_ITEMS));
    }
    lines.join("\n")
}

/// Overview of every open task a user has.
pub fn open_tasks_summary<S: AsRef<str>>(open: &[S], done_count: usize) -> String {
    let n = open.len();
    let mut message = match CountBucket::of(n) {
        CountBucket::None => {
            "📋 You have no open tasks right now. A clean slate, nice work! ✨".to_string()
        }
        CountBucket::One => format!(
            "📋 You have 1 open task:\n\n{}\n\nJust one thing to finish. You've got this! 💪",
            numbered_list(open)
        ),
        CountBucket::Few => format!(
            "📋 You have {} open tasks:\n\n{}\n\nA light load, let's knock them out! 💪",
            n,
            numbered_list(open)
        ),
        CountBucket::Many => format!(
            "📋 You have {} open tasks:\n\n{}\n\nThat's a full plate. Pick one and start small! 💪",
            n,
            numbered_list(open)
        ),
    };
    if done_count > 0 {
        message.push_str(&format!("\n\n✅ Completed so far: {}", done_count));
    }
    message
}

/// Morning briefing of the tasks due today.
pub fn tasks_for_today<S: AsRef<str>>(due_today: &[S]) -> String {
    let n = due_today.len();
    match CountBucket::of(n) {
        CountBucket::None => "🌞 Good morning! You have no tasks due today. Enjoy the free time or get ahead on something new! ✨".to_string(),
        CountBucket::One => format!(
            "🌞 Good morning! You have 1 task for today:\n\n{}\n\nYou've got this! 💪",
            numbered_list(due_today)
        ),
        CountBucket::Few => format!(
            "🌞 Good morning! You have {} tasks for today:\n\n{}\n\nA manageable day, let's get them done! 💪",
            n,
            numbered_list(due_today)
        ),
        CountBucket::Many => format!(
            "🌞 Good morning! You have a busy day with {} tasks:\n\n{}\n\nTake them one at a time! 💪",
            n,
            numbered_list(due_today)
        ),
    }
}

/// Evening wrap-up of what got done today and what is still open.
pub fn day_summary<S: AsRef<str>>(completed_today: &[S], still_open: usize) -> String {
    let n = completed_today.len();
    let mut message = match CountBucket::of(n) {
        CountBucket::None => {
            "🌙 Day's wrap-up: no tasks completed today. Tomorrow is a fresh start! 🌱".to_string()
        }
        CountBucket::One => format!(
            "🌙 Day's wrap-up: you completed 1 task today:\n\n{}\n\nEvery step counts! 👏",
            numbered_list(completed_today)
        ),
        CountBucket::Few => format!(
            "🌙 Day's wrap-up: you completed {} tasks today:\n\n{}\n\nSolid progress! 👏",
            n,
            numbered_list(completed_today)
        ),
        CountBucket::Many => format!(
            "🌙 Day's wrap-up: you completed {} tasks today:\n\n{}\n\nWhat a productive day! 🎉",
            n,
            numbered_list(completed_today)
        ),
    };
    if still_open > 0 {
        message.push_str(&format!("\n\n📌 Still open: {}", still_open));
    }
    message
}

pub fn silent_mode_activated(end_hour: u32) -> String {
    format!(
        "🔕 Silent mode is on until {:02}:00. I'll hold your reminders and send you a summary when it ends.",
        end_hour % 24
    )
}

/// "Xh Ym" for an hour or more, "N minutes" below that.
pub fn format_duration(minutes: i64) -> Result<String, fmt::Error> {
    if minutes < 0 {
        return Err(fmt::Error);
    }
    if minutes >= 60 {
        Ok(format!("{}h {}m", minutes / 60, minutes % 60))
    } else {
        Ok(format!("{} minutes", minutes))
    }
}

/// End-of-window summary of everything held back during a silent session.
pub fn silent_mode_summary(session: &SilentSession) -> Result<String, fmt::Error> {
    let duration = format_duration(session.duration_minutes)?;
    let count = session.action_count();
    let mut out = String::new();

    match count {
        0 => write!(
            out,
            "🔕 Silent mode ended after {}. Nothing new came in while you were focused.",
            duration
        )?,
        1 => write!(
            out,
            "🔕 Silent mode ended after {}. 1 thing came in while you were focused:\n",
            duration
        )?,
        n => write!(
            out,
            "🔕 Silent mode ended after {}. {} things came in while you were focused:\n",
            duration, n
        )?,
    }

    for action in session.actions.iter().take(MAX_LISTED_ITEMS) {
        write!(out, "\n• {}", shorten(&action.content, SILENT_ITEM_MAX_CHARS))?;
    }
    if count > MAX_LISTED_ITEMS {
        write!(out, "\n...and {} more!", count - MAX_LISTED_ITEMS)?;
    }
    Ok(out)
}

fn shorten(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut short: String = single_line.chars().take(max_chars - 1).collect();
    short.push('…');
    short
}
