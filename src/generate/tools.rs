//! Static knowledge used by the hardener and by deterministic backfill.
//!
//! Nothing here is ever mutated. Pools are indexed by a caller-supplied seed
//! so the same seed always yields the same choices.

/// One well-known AI tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolProfile {
    pub name: &'static str,
    pub handle: &'static str,
    pub link: &'static str,
    pub audience: &'static str,
    pub use_case: &'static str,
    pub capability: &'static str,
}

const fn tool(
    name: &'static str,
    handle: &'static str,
    link: &'static str,
    audience: &'static str,
    use_case: &'static str,
    capability: &'static str,
) -> ToolProfile {
    ToolProfile {
        name,
        handle,
        link,
        audience,
        use_case,
        capability,
    }
}

pub static TOOLS: [ToolProfile; 20] = [
    tool(
        "Cursor",
        "@cursor_ai",
        "https://cursor.com",
        "solo developers and small product teams",
        "ship whole features from one prompt without leaving the editor",
        "refactor code across dozens of files while keeping the test suite green",
    ),
    tool(
        "Perplexity",
        "@perplexity_ai",
        "https://perplexity.ai",
        "researchers and curious founders",
        "get cited answers to messy questions in seconds",
        "compare sources side by side and export a tidy brief",
    ),
    tool(
        "Notion",
        "@NotionHQ",
        "https://notion.so",
        "operations leads and writers",
        "turn scattered meeting notes into clean project docs",
        "draft specs, summarize threads and fill databases with one command",
    ),
    tool(
        "Figma",
        "@figma",
        "https://figma.com",
        "designers and front-end engineers",
        "move from rough wireframes to polished prototypes in an afternoon",
        "generate layout variations and hand off tokens straight to code",
    ),
    tool(
        "GitHub Copilot",
        "@GitHubCopilot",
        "https://github.com/features/copilot",
        "engineers working in large codebases",
        "write boilerplate, tests and docs while staying in flow",
        "review pull requests and suggest fixes before a human even looks",
    ),
    tool(
        "v0",
        "@v0",
        "https://v0.dev",
        "indie hackers and frontend tinkerers",
        "sketch a React interface by describing it in plain words",
        "produce Tailwind components ready to paste into a Next app",
    ),
    tool(
        "Replit",
        "@Replit",
        "https://replit.com",
        "students and weekend builders",
        "spin up a working app in the browser with zero setup",
        "deploy a prototype to a public URL straight from the chat panel",
    ),
    tool(
        "Midjourney",
        "@midjourney",
        "https://midjourney.com",
        "illustrators and brand marketers",
        "explore visual directions for a campaign before lunch",
        "render moodboards with consistent style references",
    ),
    tool(
        "ElevenLabs",
        "@elevenlabsio",
        "https://elevenlabs.io",
        "podcasters and course creators",
        "voice an entire lesson without booking a studio",
        "dub audio into other languages while keeping the original voice",
    ),
    tool(
        "Runway",
        "@runwayml",
        "https://runwayml.com",
        "video editors and small creative studios",
        "cut b-roll and generate shots from a text brief",
        "extend clips, remove backgrounds and match motion in minutes",
    ),
    tool(
        "LangChain",
        "@LangChainAI",
        "https://langchain.com",
        "backend engineers building agents",
        "wire models, retrievers and tools into one dependable chain",
        "trace every agent step so failures become easy to debug",
    ),
    tool(
        "Hugging Face",
        "@huggingface",
        "https://huggingface.co",
        "machine learning practitioners",
        "find, test and share open models in one place",
        "host demo Spaces that teammates can try from a link",
    ),
    tool(
        "Ollama",
        "@ollama",
        "https://ollama.com",
        "privacy minded developers",
        "run open models locally on a laptop with one command",
        "serve a local API that mirrors hosted chat endpoints",
    ),
    tool(
        "Zapier",
        "@zapier",
        "https://zapier.com",
        "non technical operators",
        "connect inboxes, sheets and CRMs without writing code",
        "let an agent route requests and update records automatically",
    ),
    tool(
        "Gamma",
        "@MeetGamma",
        "https://gamma.app",
        "consultants and startup founders",
        "turn a rough outline into a presentable deck quickly",
        "restyle every slide at once and export to PowerPoint",
    ),
    tool(
        "Supabase",
        "@supabase",
        "https://supabase.com",
        "full stack builders",
        "get Postgres, auth and storage running in minutes",
        "store embeddings next to relational data for vector search",
    ),
    tool(
        "Linear",
        "@linear",
        "https://linear.app",
        "product engineering teams",
        "keep issues, cycles and roadmaps moving without friction",
        "triage incoming bugs and draft issue descriptions automatically",
    ),
    tool(
        "Raycast",
        "@raycastapp",
        "https://raycast.com",
        "keyboard loving Mac users",
        "launch apps, scripts and snippets without touching the mouse",
        "answer questions about selected text from any window",
    ),
    tool(
        "Warp",
        "@warpdotdev",
        "https://warp.dev",
        "terminal heavy engineers",
        "recall the right shell command without searching old notes",
        "explain failing commands and propose a working fix inline",
    ),
    tool(
        "tldraw",
        "@tldraw",
        "https://tldraw.com",
        "product thinkers who sketch to explain",
        "whiteboard flows together with teammates in real time",
        "convert a napkin sketch into working HTML on the canvas",
    ),
];

impl ToolProfile {
    /// Whether `lower` (already lowercased) names this tool or its handle.
    pub fn is_named_in(&self, lower: &str) -> bool {
        contains_word(lower, &self.name.to_lowercase())
            || contains_word(lower, &self.handle.to_lowercase())
    }
}

fn contains_word(hay: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    hay.match_indices(needle).any(|(i, _)| {
        let before = hay[..i].chars().next_back();
        let after = hay[i + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

pub fn seeded<T>(pool: &[T], seed: u64) -> &T {
    &pool[(seed % pool.len() as u64) as usize]
}

/// Tool named in the text if any, otherwise one picked by seed.
pub fn tool_for(text: &str, seed: u64) -> &'static ToolProfile {
    let lower = text.to_lowercase();
    TOOLS
        .iter()
        .find(|t| t.is_named_in(&lower))
        .unwrap_or_else(|| seeded(&TOOLS, seed))
}

pub const PREFIXES: [&str; 8] = [
    "Tool:",
    "Launch:",
    "Workflow:",
    "Tip:",
    "Build:",
    "Spotlight:",
    "Ship:",
    "Stack:",
];

pub const EMOJIS: [&str; 10] = ["🚀", "⚡", "✨", "🤖", "💡", "🧠", "📈", "🎯", "🧩", "🔥"];

pub const DEFAULT_TAGS: [&str; 8] = [
    "#AI",
    "#AItools",
    "#DevTools",
    "#Productivity",
    "#BuildInPublic",
    "#GenAI",
    "#NoCode",
    "#Automation",
];

/// Padding sentences. Neighbouring seeds start [`FILLER_STRIDE`] entries apart.
pub const FILLERS: [&str; 30] = [
    "Small teams feel the difference first.",
    "Try it on one real task before deciding.",
    "The setup takes minutes, not days.",
    "Pair it with a short checklist and it sticks.",
    "Measure the hours saved after one week.",
    "It fits neatly beside the apps you already use.",
    "Start with the free tier and grow from there.",
    "Early users keep describing calmer workdays.",
    "Worth bookmarking before your next sprint.",
    "Give it a focused hour this weekend.",
    "Fewer tabs, fewer context switches.",
    "A quiet upgrade with loud results.",
    "Good defaults make the learning curve gentle.",
    "Share one result with a teammate and watch adoption spread.",
    "Keep a human review step for anything customer facing.",
    "Documentation is clear enough to skim over coffee.",
    "Expect rough edges, but the core idea is strong.",
    "It rewards clear prompts and specific goals.",
    "Automate the boring part and keep the craft.",
    "Plenty of room to customize once basics click.",
    "The community shares templates worth stealing.",
    "A side project is the safest place to build trust.",
    "Output quality improved noticeably in recent builds.",
    "Keyboard shortcuts make repeat runs painless.",
    "Costs stay predictable for light daily usage.",
    "Export options mean zero lock-in worries.",
    "Onboarding colleagues takes one short demo.",
    "Combine it with version control for safe experiments.",
    "The feedback loop is fast enough to stay curious.",
    "Great pick for anyone tired of manual glue work.",
];

pub const FILLER_STRIDE: u64 = 3;

/// Exact short pads with consecutive widths (3 to 9 chars), used when no
/// filler sentence fits the remaining room.
pub const MICRO_PADS: [&str; 7] = [
    "Go.",
    "Yes.",
    "Test.",
    "Build.",
    "Try it.",
    "Test it.",
    "Worth it.",
];

/// Number of distinct backfill angles per tool.
pub const BACKFILL_ANGLES: usize = 3;

/// Raw backfill draft for `tool` from one of [`BACKFILL_ANGLES`] angles.
/// The hardener completes it to contract.
pub fn backfill_text(tool: &ToolProfile, angle: usize, seed: u64) -> String {
    let sentence = match angle % BACKFILL_ANGLES {
        0 => format!("{} helps {} {}.", tool.name, tool.audience, tool.use_case),
        1 => format!("Worth a look today: {} can {}.", tool.name, tool.capability),
        _ => format!(
            "If you work among {}, {} deserves a slot in the stack this week.",
            tool.audience, tool.name
        ),
    };
    format!(
        "{} {} {} {} {} {}",
        seeded(&PREFIXES, seed),
        sentence,
        seeded(&EMOJIS, seed),
        tool.handle,
        tool.link,
        seeded(&DEFAULT_TAGS, seed)
    )
}

const SCAN_LEADS: [&str; 3] = [
    "Still scanning for fresh launches.",
    "No verified drop yet, so here is a standing idea.",
    "Signals are quiet right now.",
];

const SCAN_AREAS: [&str; 12] = [
    "Good moment to audit which code reviews an assistant could draft for you to approve.",
    "Try turning one recurring status meeting into a written update that a summarizer compiles.",
    "Pick a spreadsheet chore you repeat weekly and describe it to an automation builder.",
    "Record a short voice memo of your product idea and let a transcriber outline it.",
    "Feed your support inbox backlog into a classifier and see which themes dominate.",
    "Ask a design assistant for three layout variations before committing to pixels.",
    "Run a local model offline and compare its answers with your hosted favorite.",
    "Let an agent draft release notes straight from merged pull request titles.",
    "Generate unit tests for the gnarliest function in your repo and read them critically.",
    "Convert a dense whitepaper into flashcards so the key ideas actually stick.",
    "Prototype a landing page from a plain description and measure signups quickly.",
    "Clean up a messy dataset with natural language queries instead of formulas.",
];

/// How many distinct "still scanning" drafts exist before the cycle repeats.
pub const SCAN_VARIANTS: usize = SCAN_LEADS.len() * SCAN_AREAS.len();

/// Raw "still scanning" draft number `i`.
pub fn scanning_text(i: usize) -> String {
    let area = SCAN_AREAS[i % SCAN_AREAS.len()];
    let lead = SCAN_LEADS[(i / SCAN_AREAS.len()) % SCAN_LEADS.len()];
    let tool = &TOOLS[i % TOOLS.len()];
    format!(
        "Scan: {lead} {area} {} {} {} #AI",
        EMOJIS[i % EMOJIS.len()],
        tool.handle,
        tool.link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::contract::{is_well_formed_link, mentions, Contract};

    #[test]
    fn tool_table_is_self_consistent() {
        let c = Contract::default();
        for t in TOOLS.iter() {
            assert!(is_well_formed_link(t.link), "{}", t.link);
            assert_eq!(mentions(&format!("by {}", t.handle)), vec![t.handle]);
            assert_eq!(c.banned_match(t.use_case), None);
            assert_eq!(c.banned_match(t.capability), None);
        }
    }

    #[test]
    fn pools_are_free_of_banned_phrases() {
        let c = Contract::default();
        for f in FILLERS.iter().chain(MICRO_PADS.iter()).chain(SCAN_AREAS.iter()) {
            assert_eq!(c.banned_match(f), None, "{f}");
            assert!(f.ends_with('.'), "{f}");
        }
    }

    #[test]
    fn tool_lookup_prefers_named_tool() {
        assert_eq!(tool_for("Trying Warp today", 0).name, "Warp");
        assert_eq!(tool_for("shoutout to @Replit folks", 0).name, "Replit");
        // "warped" is not the tool
        assert_eq!(tool_for("time warped", 1).name, TOOLS[1].name);
    }

    #[test]
    fn micro_pads_have_consecutive_widths() {
        let widths: Vec<usize> = MICRO_PADS.iter().map(|p| p.chars().count()).collect();
        assert_eq!(widths, vec![3, 4, 5, 6, 7, 8, 9]);
    }
}
