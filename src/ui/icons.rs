//! Shared UI icons and emojis.
//!
//! Every icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Run lifecycle
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static PAUSED: Emoji<'_, '_> = Emoji("⏸️  ", "[||]");
pub static CANCELLED: Emoji<'_, '_> = Emoji("⏹️  ", "[x]");
pub static PENDING: Emoji<'_, '_> = Emoji("⏳ ", "[.]");
pub static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[-]");
pub static GATE: Emoji<'_, '_> = Emoji("🚧 ", "[GATE]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");

// Storage
pub static CHECKPOINT: Emoji<'_, '_> = Emoji("📌 ", "[CP]");
pub static ARCHIVE: Emoji<'_, '_> = Emoji("📦 ", "[ARCH]");
pub static FILE_DEL: Emoji<'_, '_> = Emoji("🗑️  ", "-");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
