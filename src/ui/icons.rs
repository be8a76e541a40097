//! Outcome and report glyphs, with ASCII fallbacks for dumb terminals.

use console::Emoji;

// Outcome markers
pub static CHECK: Emoji<'_, '_> = Emoji("✓", "+");
pub static SKIP: Emoji<'_, '_> = Emoji("⊘", "-");
pub static CROSS: Emoji<'_, '_> = Emoji("✗", "x");

// Plan and summaries
pub static BULLET: Emoji<'_, '_> = Emoji("•", "*");
pub static PREVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[DRY RUN] ");
pub static FLEET: Emoji<'_, '_> = Emoji("🚢 ", "");
pub static STATUS: Emoji<'_, '_> = Emoji("📊 ", "");
