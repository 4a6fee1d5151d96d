use once_cell::sync::Lazy;
use regex::Regex;

// === Line header ===
// "[2024.01.01-00.00.00][LogTheIsleKillData]: {body}"
pub static KILL_FEED_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d{4}\.\d{2}\.\d{2}-\d{2}\.\d{2}\.\d{2})\]\[LogTheIsleKillData\]:\s+(.+)$")
        .unwrap()
});

// === Subject ===
// "{name} [{id}] Dino: {creature}, {Male|Female}, {growth} - {outcome}"
// The id group accepts anything inside the brackets so bad ids can be reported, not dropped.
pub static SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)\s+\[([^\]]*)\]\s+Dino:\s+(.*?),\s+(Male|Female),\s+([\d.]+)\s+-\s+(.+)$")
        .unwrap()
});

// === Outcomes ===
pub static NATURAL_DEATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Died from Natural cause").unwrap());
// "Killed the following player: {name}, [{id}], Dino: {creature}, Gender: {g}, Growth: {growth}"
pub static KILLED_PLAYER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Killed\s+the\s+following\s+player:\s+(.*?),\s+\[([^\]]*)\],\s+Dino:\s+(.*?),\s+Gender:\s+(Male|Female),\s+Growth:\s+([\d.]+)",
    )
    .unwrap()
});
