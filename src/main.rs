use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Alignment},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use serde::{Deserialize, Serialize};
use std::{env, fmt, fs};
use std::{error::Error, io, time::{Duration, Instant}};
use std::time::{SystemTime, UNIX_EPOCH};

// Cosmetic pacing only, correctness never depends on these
const FEEDBACK_DURATION: Duration = Duration::from_millis(900);
const REVEAL_DELAY: Duration = Duration::from_millis(1500);
const ACTIVITY_FEED_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn name(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    fn other(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MatchableItem {
    id: u32,
    label: String,
    icon: String,
}

impl MatchableItem {
    fn new(id: u32, label: &str, icon: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            icon: icon.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CorrectMatch {
    left_id: u32,
    right_id: u32,
}

fn pair(left_id: u32, right_id: u32) -> CorrectMatch {
    CorrectMatch { left_id, right_id }
}

fn default_pass_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RewardPlan {
    coins_per_level: u32,
    total_coins: u32,
    total_xp: u32,
    #[serde(default = "default_pass_threshold")]
    pass_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PuzzleDefinition {
    id: String,
    title: String,
    subject: String,
    left_heading: String,
    right_heading: String,
    left_pool: Vec<MatchableItem>,
    right_pool: Vec<MatchableItem>,
    correct_matches: Vec<CorrectMatch>,
    rewards: RewardPlan,
}

impl PuzzleDefinition {
    // Content mistakes surface here, before a session ever starts.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.left_pool.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        if self.left_pool.len() != self.right_pool.len()
            || self.correct_matches.len() != self.left_pool.len()
        {
            return Err(ConfigError::SizeMismatch {
                left: self.left_pool.len(),
                right: self.right_pool.len(),
                matches: self.correct_matches.len(),
            });
        }

        for (side, pool) in [(Side::Left, &self.left_pool), (Side::Right, &self.right_pool)] {
            for (i, item) in pool.iter().enumerate() {
                if pool[..i].iter().any(|other| other.id == item.id) {
                    return Err(ConfigError::DuplicateItem { side, id: item.id });
                }
            }
        }

        // Equal sizes plus one-use-per-id makes the table a full bijection
        for (i, m) in self.correct_matches.iter().enumerate() {
            if !self.left_pool.iter().any(|item| item.id == m.left_id) {
                return Err(ConfigError::UnknownItem {
                    side: Side::Left,
                    id: m.left_id,
                });
            }
            if !self.right_pool.iter().any(|item| item.id == m.right_id) {
                return Err(ConfigError::UnknownItem {
                    side: Side::Right,
                    id: m.right_id,
                });
            }
            if self.correct_matches[..i].iter().any(|other| other.left_id == m.left_id) {
                return Err(ConfigError::NotABijection {
                    side: Side::Left,
                    id: m.left_id,
                });
            }
            if self.correct_matches[..i].iter().any(|other| other.right_id == m.right_id) {
                return Err(ConfigError::NotABijection {
                    side: Side::Right,
                    id: m.right_id,
                });
            }
        }

        Ok(())
    }

    fn pool(&self, side: Side) -> &[MatchableItem] {
        match side {
            Side::Left => &self.left_pool,
            Side::Right => &self.right_pool,
        }
    }

    fn item(&self, side: Side, id: u32) -> Option<&MatchableItem> {
        self.pool(side).iter().find(|item| item.id == id)
    }

    fn partner_of(&self, left_id: u32) -> Option<u32> {
        self.correct_matches
            .iter()
            .find(|m| m.left_id == left_id)
            .map(|m| m.right_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigError {
    EmptyPool,
    SizeMismatch { left: usize, right: usize, matches: usize },
    DuplicateItem { side: Side, id: u32 },
    UnknownItem { side: Side, id: u32 },
    NotABijection { side: Side, id: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyPool => write!(f, "puzzle has no items"),
            ConfigError::SizeMismatch { left, right, matches } => write!(
                f,
                "pools and match table must be the same size (left {}, right {}, matches {})",
                left, right, matches
            ),
            ConfigError::DuplicateItem { side, id } => {
                write!(f, "duplicate id {} in the {} pool", id, side.name())
            }
            ConfigError::UnknownItem { side, id } => {
                write!(f, "match table references unknown {} id {}", side.name(), id)
            }
            ConfigError::NotABijection { side, id } => {
                write!(f, "{} id {} is matched more than once", side.name(), id)
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MatchAttempt {
    left_id: u32,
    right_id: u32,
    is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Idle,
    LeftSelected,
    RightSelected,
    BothSelected,
    Finished,
}

#[derive(Debug, Clone)]
struct MatchSession {
    puzzle: PuzzleDefinition,
    attempts: Vec<MatchAttempt>,
    selected_left: Option<u32>,
    selected_right: Option<u32>,
    score: u32,
}

impl MatchSession {
    fn new(puzzle: PuzzleDefinition) -> Result<Self, ConfigError> {
        puzzle.validate()?;
        Ok(Self {
            puzzle,
            attempts: Vec::new(),
            selected_left: None,
            selected_right: None,
            score: 0,
        })
    }

    fn puzzle(&self) -> &PuzzleDefinition {
        &self.puzzle
    }

    fn phase(&self) -> SessionPhase {
        if self.is_finished() {
            return SessionPhase::Finished;
        }
        match (self.selected_left, self.selected_right) {
            (None, None) => SessionPhase::Idle,
            (Some(_), None) => SessionPhase::LeftSelected,
            (None, Some(_)) => SessionPhase::RightSelected,
            (Some(_), Some(_)) => SessionPhase::BothSelected,
        }
    }

    fn is_finished(&self) -> bool {
        self.attempts.len() == self.puzzle.left_pool.len()
    }

    // An item stays consumed whether the attempt was right or wrong
    fn is_consumed(&self, side: Side, id: u32) -> bool {
        self.attempts.iter().any(|attempt| match side {
            Side::Left => attempt.left_id == id,
            Side::Right => attempt.right_id == id,
        })
    }

    fn selected(&self, side: Side) -> Option<u32> {
        match side {
            Side::Left => self.selected_left,
            Side::Right => self.selected_right,
        }
    }

    // Invalid picks are quiet no-ops, the UI simply shows nothing happened
    fn select(&mut self, side: Side, id: u32) -> bool {
        if self.is_finished() || self.puzzle.item(side, id).is_none() || self.is_consumed(side, id)
        {
            return false;
        }
        match side {
            Side::Left => self.selected_left = Some(id),
            Side::Right => self.selected_right = Some(id),
        }
        true
    }

    fn can_commit(&self) -> bool {
        self.phase() == SessionPhase::BothSelected
    }

    fn commit(&mut self) -> Option<MatchAttempt> {
        if !self.can_commit() {
            return None;
        }
        let left_id = self.selected_left.take()?;
        let right_id = self.selected_right.take()?;
        let is_correct = self.puzzle.partner_of(left_id) == Some(right_id);
        let attempt = MatchAttempt {
            left_id,
            right_id,
            is_correct,
        };
        self.attempts.push(attempt);
        if is_correct {
            self.score += 1;
        }
        Some(attempt)
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn max_score(&self) -> u32 {
        self.puzzle.left_pool.len() as u32
    }

    fn remaining(&self) -> usize {
        self.puzzle.left_pool.len() - self.attempts.len()
    }

    fn attempts(&self) -> &[MatchAttempt] {
        &self.attempts
    }

    // The only way to fix a wrong match is a fresh board
    fn reset(&mut self) {
        self.attempts.clear();
        self.selected_left = None;
        self.selected_right = None;
        self.score = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionResult {
    score: u32,
    max_score: u32,
    passed: bool,
    perfect: bool,
    coins_earned: u32,
    xp_earned: u32,
}

fn score_session(session: &MatchSession) -> Option<SessionResult> {
    if !session.is_finished() {
        return None;
    }
    let rewards = &session.puzzle().rewards;
    let score = session.score();
    let max_score = session.max_score();
    let passed = score >= rewards.pass_threshold;
    let coins_earned = (score * rewards.coins_per_level).min(rewards.total_coins);
    let xp_earned = if passed { rewards.total_xp } else { 0 };
    Some(SessionResult {
        score,
        max_score,
        passed,
        perfect: score == max_score,
        coins_earned,
        xp_earned,
    })
}

// Right-pool indices reordered so entry i is the correct partner of left_pool[i]
fn aligned_right_order(puzzle: &PuzzleDefinition) -> Vec<usize> {
    puzzle
        .left_pool
        .iter()
        .enumerate()
        .map(|(i, left)| {
            puzzle
                .partner_of(left.id)
                .and_then(|right_id| {
                    puzzle.right_pool.iter().position(|item| item.id == right_id)
                })
                .unwrap_or(i)
        })
        .collect()
}

// Rotating the aligned order by 1..n keeps every right item off its partner's row,
// so screen position never gives the answer away
fn display_order(puzzle: &PuzzleDefinition, seed: u64) -> Vec<usize> {
    let aligned = aligned_right_order(puzzle);
    let n = aligned.len();
    if n < 2 {
        return aligned;
    }
    let k = 1 + (seed as usize) % (n - 1);
    (0..n).map(|i| aligned[(i + k) % n]).collect()
}

fn session_seed(counter: u64) -> u64 {
    // Wall-clock seconds stirred with a per-run counter, plenty for board shuffling
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.wrapping_add(counter.wrapping_mul(7))
}

fn builtin_catalog() -> Vec<PuzzleDefinition> {
    vec![
        PuzzleDefinition {
            id: "investment-types".to_string(),
            title: "Investment Match".to_string(),
            subject: "Financial Literacy".to_string(),
            left_heading: "Investment".to_string(),
            right_heading: "What it's like".to_string(),
            left_pool: vec![
                MatchableItem::new(1, "Fixed Deposit", "🏦"),
                MatchableItem::new(2, "Stocks", "📈"),
                MatchableItem::new(3, "Mutual Fund", "📊"),
                MatchableItem::new(4, "Bonds", "📜"),
                MatchableItem::new(5, "Real Estate", "🏠"),
            ],
            right_pool: vec![
                MatchableItem::new(1, "Diversified", "🧺"),
                MatchableItem::new(2, "Long-term", "⏳"),
                MatchableItem::new(3, "Risky", "🎢"),
                MatchableItem::new(4, "Safe", "🛡️"),
                MatchableItem::new(5, "Stable", "⚖️"),
            ],
            correct_matches: vec![pair(1, 4), pair(2, 3), pair(3, 1), pair(4, 5), pair(5, 2)],
            rewards: RewardPlan {
                coins_per_level: 25,
                total_coins: 125,
                total_xp: 50,
                pass_threshold: 3,
            },
        },
        PuzzleDefinition {
            id: "know-your-rights".to_string(),
            title: "Know Your Rights".to_string(),
            subject: "Civics".to_string(),
            left_heading: "Right".to_string(),
            right_heading: "What it means".to_string(),
            left_pool: vec![
                MatchableItem::new(1, "Right to Education", "📚"),
                MatchableItem::new(2, "Right to Vote", "🗳️"),
                MatchableItem::new(3, "Freedom of Speech", "🗣️"),
                MatchableItem::new(4, "Right to Equality", "⚖️"),
                MatchableItem::new(5, "Right to Privacy", "🔒"),
            ],
            right_pool: vec![
                MatchableItem::new(1, "Sharing your opinion", "💬"),
                MatchableItem::new(2, "Fair treatment for all", "🤝"),
                MatchableItem::new(3, "Going to school", "🏫"),
                MatchableItem::new(4, "Keeping personal things personal", "🤫"),
                MatchableItem::new(5, "Choosing leaders", "🙋"),
            ],
            correct_matches: vec![pair(1, 3), pair(2, 5), pair(3, 1), pair(4, 2), pair(5, 4)],
            rewards: RewardPlan {
                coins_per_level: 20,
                total_coins: 100,
                total_xp: 40,
                pass_threshold: 3,
            },
        },
        PuzzleDefinition {
            id: "saving-goals".to_string(),
            title: "Saving Goals".to_string(),
            subject: "Financial Literacy".to_string(),
            left_heading: "Goal".to_string(),
            right_heading: "Best fit".to_string(),
            left_pool: vec![
                MatchableItem::new(1, "New Bicycle", "🚲"),
                MatchableItem::new(2, "College Fund", "🎓"),
                MatchableItem::new(3, "Emergency Fund", "🚑"),
                MatchableItem::new(4, "Video Game", "🎮"),
                MatchableItem::new(5, "Family Vacation", "🏖️"),
            ],
            right_pool: vec![
                MatchableItem::new(1, "Safety net", "🪢"),
                MatchableItem::new(2, "Pocket money", "🪙"),
                MatchableItem::new(3, "Long-term saving", "🏦"),
                MatchableItem::new(4, "Medium-term saving", "📆"),
                MatchableItem::new(5, "Short-term saving", "🗓️"),
            ],
            correct_matches: vec![pair(1, 5), pair(2, 3), pair(3, 1), pair(4, 2), pair(5, 4)],
            rewards: RewardPlan {
                coins_per_level: 25,
                total_coins: 125,
                total_xp: 50,
                pass_threshold: 3,
            },
        },
        PuzzleDefinition {
            id: "spending-priorities".to_string(),
            title: "Spending Priorities".to_string(),
            subject: "Financial Literacy".to_string(),
            left_heading: "Purchase".to_string(),
            right_heading: "Priority".to_string(),
            left_pool: vec![
                MatchableItem::new(1, "Medicine", "💊"),
                MatchableItem::new(2, "School Supplies", "✏️"),
                MatchableItem::new(3, "New Phone", "📱"),
                MatchableItem::new(4, "Concert Tickets", "🎟️"),
                MatchableItem::new(5, "Groceries", "🥦"),
            ],
            right_pool: vec![
                MatchableItem::new(1, "Want", "🤔"),
                MatchableItem::new(2, "Everyday need", "🛒"),
                MatchableItem::new(3, "Luxury", "✨"),
                MatchableItem::new(4, "Urgent need", "🚨"),
                MatchableItem::new(5, "Important need", "🎒"),
            ],
            correct_matches: vec![pair(1, 4), pair(2, 5), pair(3, 1), pair(4, 3), pair(5, 2)],
            rewards: RewardPlan {
                coins_per_level: 20,
                total_coins: 100,
                total_xp: 40,
                pass_threshold: 3,
            },
        },
        PuzzleDefinition {
            id: "right-vs-wrong".to_string(),
            title: "Right vs Wrong".to_string(),
            subject: "Civics".to_string(),
            left_heading: "Action".to_string(),
            right_heading: "Consequence".to_string(),
            left_pool: vec![
                MatchableItem::new(1, "Returning a lost wallet", "👛"),
                MatchableItem::new(2, "Copying homework", "📋"),
                MatchableItem::new(3, "Recycling waste", "♻️"),
                MatchableItem::new(4, "Jumping the queue", "🏃"),
                MatchableItem::new(5, "Helping a neighbor", "🧓"),
            ],
            right_pool: vec![
                MatchableItem::new(1, "Upsets others", "😠"),
                MatchableItem::new(2, "Builds trust", "🤝"),
                MatchableItem::new(3, "Stronger community", "🏘️"),
                MatchableItem::new(4, "Cleaner city", "🏙️"),
                MatchableItem::new(5, "Learns nothing", "🚫"),
            ],
            correct_matches: vec![pair(1, 2), pair(2, 5), pair(3, 4), pair(4, 1), pair(5, 3)],
            rewards: RewardPlan {
                coins_per_level: 20,
                total_coins: 100,
                total_xp: 40,
                pass_threshold: 3,
            },
        },
        PuzzleDefinition {
            id: "budget-basics".to_string(),
            title: "Budget Basics".to_string(),
            subject: "Financial Literacy".to_string(),
            left_heading: "Term".to_string(),
            right_heading: "Definition".to_string(),
            left_pool: vec![
                MatchableItem::new(1, "Income", "💵"),
                MatchableItem::new(2, "Expense", "🧾"),
                MatchableItem::new(3, "Savings", "🐖"),
                MatchableItem::new(4, "Budget", "📒"),
                MatchableItem::new(5, "Interest", "🌱"),
            ],
            right_pool: vec![
                MatchableItem::new(1, "Money set aside", "🔐"),
                MatchableItem::new(2, "A plan for spending", "🗺️"),
                MatchableItem::new(3, "Money coming in", "📥"),
                MatchableItem::new(4, "Money your savings earn", "💹"),
                MatchableItem::new(5, "Money going out", "📤"),
            ],
            correct_matches: vec![pair(1, 3), pair(2, 5), pair(3, 1), pair(4, 2), pair(5, 4)],
            rewards: RewardPlan {
                coins_per_level: 30,
                total_coins: 150,
                total_xp: 60,
                pass_threshold: 3,
            },
        },
    ]
}

// A pack replaces the whole catalog, so authors see exactly what they shipped
fn load_puzzle_pack(path: &str) -> Result<Vec<PuzzleDefinition>, Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let pack: Vec<PuzzleDefinition> = serde_json::from_str(&raw)?;
    if pack.is_empty() {
        return Err("puzzle pack contains no puzzles".into());
    }
    for puzzle in &pack {
        puzzle
            .validate()
            .map_err(|err| format!("puzzle '{}': {}", puzzle.id, err))?;
    }
    Ok(pack)
}

#[derive(Debug)]
struct Profile {
    coins: u32,
    xp: u32,
    puzzles_completed: u32,
    recent_activities: Vec<String>,
}

impl Profile {
    fn new() -> Self {
        Self {
            coins: 0,
            xp: 0,
            puzzles_completed: 0,
            recent_activities: vec![
                "Welcome to Match Quest!".to_string(),
                "Pick a puzzle and pair up both columns".to_string(),
            ],
        }
    }

    fn log_activity(&mut self, message: &str) {
        self.recent_activities.insert(0, message.to_string());
        if self.recent_activities.len() > ACTIVITY_FEED_LIMIT {
            self.recent_activities.truncate(ACTIVITY_FEED_LIMIT);
        }
    }

    fn grant(&mut self, result: &SessionResult) {
        self.coins += result.coins_earned;
        self.xp += result.xp_earned;
        self.puzzles_completed += 1;
    }
}

#[derive(Debug, Clone)]
enum Screen {
    MainMenu,
    PuzzleSelect,
    Playing,
    Results,
    HowToPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackKind {
    Correct,
    Incorrect,
}

#[derive(Debug)]
struct Feedback {
    kind: FeedbackKind,
    message: String,
    until: Instant,
}

#[derive(Debug)]
struct ActiveSession {
    session: MatchSession,
    display_order: Vec<usize>,
    active_side: Side,
    cursor: usize,
    feedback: Option<Feedback>,
    reveal_at: Option<Instant>,
    result: Option<SessionResult>,
}

impl ActiveSession {
    fn new(session: MatchSession, seed: u64) -> Self {
        let display_order = display_order(session.puzzle(), seed);
        Self {
            session,
            display_order,
            active_side: Side::Left,
            cursor: 0,
            feedback: None,
            reveal_at: None,
            result: None,
        }
    }

    // Item id under the cursor, respecting the shuffled right column
    fn highlighted_id(&self) -> Option<u32> {
        match self.active_side {
            Side::Left => self
                .session
                .puzzle()
                .left_pool
                .get(self.cursor)
                .map(|item| item.id),
            Side::Right => self
                .display_order
                .get(self.cursor)
                .and_then(|&idx| self.session.puzzle().right_pool.get(idx))
                .map(|item| item.id),
        }
    }
}

#[derive(Debug)]
struct App {
    screen: Screen,
    selected_menu_item: usize,
    should_quit: bool,
    catalog: Vec<PuzzleDefinition>,
    profile: Profile,
    active: Option<ActiveSession>,
    sessions_started: u64,
}

impl App {
    fn new(catalog: Vec<PuzzleDefinition>) -> App {
        App {
            screen: Screen::MainMenu,
            selected_menu_item: 0,
            should_quit: false,
            catalog,
            profile: Profile::new(),
            active: None,
            sessions_started: 0,
        }
    }

    // Expire the feedback pulse and fire the one-shot results reveal
    fn tick(&mut self) {
        let now = Instant::now();
        let mut reveal = false;
        if let Some(active) = self.active.as_mut() {
            if active.feedback.as_ref().is_some_and(|fb| now >= fb.until) {
                active.feedback = None;
            }
            if active.result.is_none() && active.reveal_at.is_some_and(|at| now >= at) {
                reveal = true;
            }
        }
        if reveal {
            self.reveal_results();
        }
    }

    fn reveal_results(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.result.is_some() {
            return;
        }
        let Some(result) = score_session(&active.session) else {
            return;
        };
        active.result = Some(result);
        active.reveal_at = None;
        let title = active.session.puzzle().title.clone();
        self.profile.grant(&result);
        self.profile.log_activity(&format!(
            "🎉 {}: {}/{} - earned {} coins, {} XP",
            title, result.score, result.max_score, result.coins_earned, result.xp_earned
        ));
        self.screen = Screen::Results;
        self.selected_menu_item = 0;
    }

    fn menu_len(&self) -> usize {
        match self.screen {
            Screen::MainMenu => 3, // Play, How to Play, Quit
            Screen::PuzzleSelect => self.catalog.len().max(1),
            Screen::Results => 2, // Try Again, Back to Puzzles
            _ => 1,
        }
    }

    fn next_menu_item(&mut self) {
        let menu_items = self.menu_len();
        self.selected_menu_item = (self.selected_menu_item + 1) % menu_items;
    }

    fn previous_menu_item(&mut self) {
        let menu_items = self.menu_len();
        if self.selected_menu_item > 0 {
            self.selected_menu_item -= 1;
        } else {
            self.selected_menu_item = menu_items - 1;
        }
    }

    fn cursor_down(&mut self) {
        if matches!(self.screen, Screen::Playing) {
            self.move_cursor(true);
        } else {
            self.next_menu_item();
        }
    }

    fn cursor_up(&mut self) {
        if matches!(self.screen, Screen::Playing) {
            self.move_cursor(false);
        } else {
            self.previous_menu_item();
        }
    }

    fn move_cursor(&mut self, down: bool) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let len = active.session.puzzle().left_pool.len();
        if len == 0 {
            return;
        }
        if down {
            active.cursor = (active.cursor + 1) % len;
        } else if active.cursor > 0 {
            active.cursor -= 1;
        } else {
            active.cursor = len - 1;
        }
    }

    fn switch_column(&mut self) {
        if !matches!(self.screen, Screen::Playing) {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.active_side = active.active_side.other();
        }
    }

    fn select_menu_item(&mut self) {
        match self.screen {
            Screen::MainMenu => match self.selected_menu_item {
                0 => {
                    self.screen = Screen::PuzzleSelect;
                    self.selected_menu_item = 0;
                }
                1 => self.screen = Screen::HowToPlay,
                2 => self.should_quit = true,
                _ => {}
            },
            Screen::PuzzleSelect => self.start_puzzle(self.selected_menu_item),
            Screen::Playing => self.select_highlighted(),
            Screen::Results => match self.selected_menu_item {
                0 => self.retry_session(),
                1 => self.back_to_puzzles(),
                _ => {}
            },
            Screen::HowToPlay => {
                self.screen = Screen::MainMenu;
                self.selected_menu_item = 0;
            }
        }
    }

    fn start_puzzle(&mut self, index: usize) {
        let Some(puzzle) = self.catalog.get(index) else {
            return;
        };
        match MatchSession::new(puzzle.clone()) {
            Ok(session) => {
                self.sessions_started += 1;
                let seed = session_seed(self.sessions_started);
                let title = session.puzzle().title.clone();
                self.active = Some(ActiveSession::new(session, seed));
                self.screen = Screen::Playing;
                self.selected_menu_item = 0;
                self.profile.log_activity(&format!("🧩 Started {}", title));
            }
            Err(err) => {
                let title = puzzle.title.clone();
                self.profile
                    .log_activity(&format!("⚠️ {} can't be played: {}", title, err));
            }
        }
    }

    fn select_highlighted(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(id) = active.highlighted_id() else {
            return;
        };
        let side = active.active_side;
        if active.session.select(side, id) {
            // Hop to the other column so the partner pick is one keypress away
            if active.session.selected(side.other()).is_none() {
                active.active_side = side.other();
            }
        }
    }

    fn commit_selected(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(attempt) = active.session.commit() else {
            return;
        };
        let puzzle = active.session.puzzle();
        let left_label = puzzle
            .item(Side::Left, attempt.left_id)
            .map(|item| item.label.clone())
            .unwrap_or_default();
        let right_label = puzzle
            .item(Side::Right, attempt.right_id)
            .map(|item| item.label.clone())
            .unwrap_or_default();
        let (kind, message) = if attempt.is_correct {
            (
                FeedbackKind::Correct,
                format!("✅ {} ↔ {}", left_label, right_label),
            )
        } else {
            (
                FeedbackKind::Incorrect,
                format!("❌ {} ↔ {} don't go together", left_label, right_label),
            )
        };
        active.feedback = Some(Feedback {
            kind,
            message: message.clone(),
            until: Instant::now() + FEEDBACK_DURATION,
        });
        if active.session.is_finished() {
            // Let the last pulse play out before the summary appears
            active.reveal_at = Some(Instant::now() + REVEAL_DELAY);
        }
        self.profile.log_activity(&message);
    }

    fn retry_session(&mut self) {
        if self.active.is_none() {
            return;
        }
        self.sessions_started += 1;
        let seed = session_seed(self.sessions_started);
        if let Some(active) = self.active.as_mut() {
            active.session.reset();
            active.display_order = display_order(active.session.puzzle(), seed);
            active.active_side = Side::Left;
            active.cursor = 0;
            active.feedback = None;
            active.reveal_at = None;
            active.result = None;
        }
        self.screen = Screen::Playing;
        self.selected_menu_item = 0;
        self.profile.log_activity("🔁 Trying again");
    }

    fn back_to_puzzles(&mut self) {
        self.active = None;
        self.screen = Screen::PuzzleSelect;
        self.selected_menu_item = 0;
    }

    fn go_back(&mut self) {
        match self.screen {
            Screen::MainMenu => self.should_quit = true,
            Screen::PuzzleSelect | Screen::HowToPlay => {
                self.screen = Screen::MainMenu;
                self.selected_menu_item = 0;
            }
            Screen::Playing | Screen::Results => self.back_to_puzzles(),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Optional puzzle pack on the command line, built-ins otherwise
    let (catalog, pack_note) = match env::args().nth(1) {
        Some(path) => match load_puzzle_pack(&path) {
            Ok(pack) => {
                let note = format!("📦 Loaded {} puzzles from {}", pack.len(), path);
                (pack, Some(note))
            }
            Err(err) => {
                eprintln!("Could not load puzzle pack {}: {}", path, err);
                (
                    builtin_catalog(),
                    Some("⚠️ Puzzle pack failed to load - using built-in puzzles".to_string()),
                )
            }
        },
        None => (builtin_catalog(), None),
    };

    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let mut app = App::new(catalog);
    if let Some(note) = pack_note {
        app.profile.log_activity(&note);
    }
    let res = run_app(&mut terminal, app);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    loop {
        // Advance the cosmetic timers
        app.tick();

        terminal.draw(|f| ui(f, &app))?;

        // Use poll instead of read to avoid blocking
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Esc => app.go_back(),
                    KeyCode::Down => app.cursor_down(),
                    KeyCode::Up => app.cursor_up(),
                    KeyCode::Enter => app.select_menu_item(),
                    KeyCode::Left | KeyCode::Right | KeyCode::Tab => app.switch_column(),
                    KeyCode::Char(' ') => app.commit_selected(),
                    KeyCode::Char('r') if matches!(app.screen, Screen::Results) => {
                        app.retry_session()
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    match app.screen {
        Screen::MainMenu => draw_main_menu(f, app),
        Screen::PuzzleSelect => draw_puzzle_select(f, app),
        Screen::Playing => draw_playing(f, app),
        Screen::Results => draw_results(f, app),
        Screen::HowToPlay => draw_how_to_play(f),
    }
}

fn draw_main_menu(f: &mut Frame, app: &App) {
    let size = f.area();

    let block = Block::default()
        .title("MATCH QUEST")
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::White));

    let menu_items = vec!["Play", "How to Play", "Quit"];

    let items: Vec<ListItem> = menu_items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let style = if i == app.selected_menu_item {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if i == app.selected_menu_item { "► " } else { "  " };
            ListItem::new(Line::from(Span::styled(format!("{}{}", prefix, item), style)))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .style(Style::default().fg(Color::White));

    let area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(100)])
        .split(size)[0];

    f.render_widget(list, area);

    // Instructions at the bottom
    let instructions = Paragraph::new("Use ↑↓ to navigate, Enter to select, Q to quit")
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);

    let instruction_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(size)[1];

    f.render_widget(instructions, instruction_area);
}

fn draw_puzzle_select(f: &mut Frame, app: &App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Footer
        ])
        .split(size);

    // Header with wallet stats
    let header_text = format!(
        "Coins: 🪙 {}    XP: ⭐ {}    Puzzles completed: {}",
        app.profile.coins, app.profile.xp, app.profile.puzzles_completed
    );

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .title("Match Quest")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::Green))
        .alignment(Alignment::Center);

    f.render_widget(header, chunks[0]);

    // Main content area split into puzzle list and activity feed
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(50), // Puzzles
            Constraint::Percentage(50), // Activity feed
        ])
        .split(chunks[1]);

    let puzzle_items: Vec<ListItem> = app
        .catalog
        .iter()
        .enumerate()
        .map(|(i, puzzle)| {
            let style = if i == app.selected_menu_item {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if i == app.selected_menu_item { "► " } else { "  " };
            let text = format!(
                "{}{} · {} ({} pairs, up to {} coins)",
                prefix,
                puzzle.title,
                puzzle.subject,
                puzzle.left_pool.len(),
                puzzle.rewards.total_coins
            );
            ListItem::new(Line::from(Span::styled(text, style)))
        })
        .collect();

    let puzzle_list = List::new(puzzle_items)
        .block(
            Block::default()
                .title("Puzzles")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(puzzle_list, main_chunks[0]);

    // Recent activity feed
    let activity_items: Vec<ListItem> = app
        .profile
        .recent_activities
        .iter()
        .map(|activity| {
            ListItem::new(Line::from(Span::styled(
                format!("• {}", activity),
                Style::default().fg(Color::Cyan),
            )))
        })
        .collect();

    let activity_list = List::new(activity_items)
        .block(
            Block::default()
                .title("Recent Activity")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(activity_list, main_chunks[1]);

    let footer_text = "↑↓ Select  Enter Play  Esc Back  Q Quit";
    let footer = Paragraph::new(footer_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);

    f.render_widget(footer, chunks[2]);
}

fn draw_playing(f: &mut Frame, app: &App) {
    let Some(active) = app.active.as_ref() else {
        return;
    };
    let size = f.area();
    let puzzle = active.session.puzzle();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Board
            Constraint::Length(3), // Feedback banner
            Constraint::Length(3), // Footer
        ])
        .split(size);

    // Header with session progress and wallet
    let header_text = format!(
        "{}    Score: {}/{}    {} to go    🪙 {}  ⭐ {}",
        puzzle.title,
        active.session.score(),
        active.session.max_score(),
        active.session.remaining(),
        app.profile.coins,
        app.profile.xp
    );

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .title(puzzle.subject.clone())
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::Green))
        .alignment(Alignment::Center);

    f.render_widget(header, chunks[0]);

    // The board: left column in pool order, right column shuffled
    let board_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let left_items: Vec<ListItem> = puzzle
        .left_pool
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let is_cursor = active.active_side == Side::Left && i == active.cursor;
            let is_selected = active.session.selected(Side::Left) == Some(item.id);
            let consumed = active.session.is_consumed(Side::Left, item.id);

            let style = if is_cursor {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if consumed {
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else if is_selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if is_cursor {
                "► "
            } else if is_selected {
                "● "
            } else {
                "  "
            };
            ListItem::new(Line::from(Span::styled(
                format!("{}{} {}", prefix, item.icon, item.label),
                style,
            )))
        })
        .collect();

    let left_block_style = if active.active_side == Side::Left {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    let left_list = List::new(left_items).block(
        Block::default()
            .title(puzzle.left_heading.clone())
            .borders(Borders::ALL)
            .style(left_block_style),
    );

    f.render_widget(left_list, board_chunks[0]);

    let right_items: Vec<ListItem> = active
        .display_order
        .iter()
        .enumerate()
        .map(|(row, &idx)| {
            let item = &puzzle.right_pool[idx];
            let is_cursor = active.active_side == Side::Right && row == active.cursor;
            let is_selected = active.session.selected(Side::Right) == Some(item.id);
            let consumed = active.session.is_consumed(Side::Right, item.id);

            let style = if is_cursor {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if consumed {
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else if is_selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if is_cursor {
                "► "
            } else if is_selected {
                "● "
            } else {
                "  "
            };
            ListItem::new(Line::from(Span::styled(
                format!("{}{} {}", prefix, item.icon, item.label),
                style,
            )))
        })
        .collect();

    let right_block_style = if active.active_side == Side::Right {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    let right_list = List::new(right_items).block(
        Block::default()
            .title(puzzle.right_heading.clone())
            .borders(Borders::ALL)
            .style(right_block_style),
    );

    f.render_widget(right_list, board_chunks[1]);

    // Feedback banner, falls back to a phase hint
    let (banner, banner_style) = if let Some(fb) = &active.feedback {
        let color = match fb.kind {
            FeedbackKind::Correct => Color::Green,
            FeedbackKind::Incorrect => Color::Red,
        };
        (
            fb.message.clone(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )
    } else if active.reveal_at.is_some() {
        (
            "🧮 Tallying your score...".to_string(),
            Style::default().fg(Color::Cyan),
        )
    } else if active.session.can_commit() {
        (
            "Press Space to confirm this match".to_string(),
            Style::default().fg(Color::Yellow),
        )
    } else {
        let hint = match active.session.phase() {
            SessionPhase::LeftSelected => "Now pick the partner from the right column",
            SessionPhase::RightSelected => "Now pick the partner from the left column",
            _ => "Pick an item in each column, then press Space to match them",
        };
        (hint.to_string(), Style::default().fg(Color::Gray))
    };

    let feedback = Paragraph::new(banner)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(banner_style)
        .alignment(Alignment::Center);

    f.render_widget(feedback, chunks[2]);

    let footer_text = "←→ Column  ↑↓ Move  Enter Select  Space Match  Esc Leave Puzzle";
    let footer = Paragraph::new(footer_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);

    f.render_widget(footer, chunks[3]);
}

fn draw_results(f: &mut Frame, app: &App) {
    let Some(active) = app.active.as_ref() else {
        return;
    };
    let Some(result) = active.result else {
        return;
    };
    let size = f.area();
    let puzzle = active.session.puzzle();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(7), // Summary
            Constraint::Min(0),    // Options
            Constraint::Length(3), // Footer
        ])
        .split(size);

    let header = Paragraph::new(format!("{} - Complete!", puzzle.title))
        .block(
            Block::default()
                .title("PUZZLE COMPLETE")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);

    f.render_widget(header, chunks[0]);

    let tier_message = if result.perfect {
        "🏆 Perfect match! You nailed every single pair!"
    } else if result.passed {
        "🎉 Great work! You really know your stuff."
    } else {
        "💪 Good effort - give it another shot!"
    };

    let summary_lines = vec![
        Line::from(format!("You scored {} out of {}", result.score, result.max_score)),
        Line::from(""),
        Line::from(Span::styled(
            tier_message,
            Style::default().fg(if result.passed { Color::Green } else { Color::Yellow }),
        )),
        Line::from(""),
        Line::from(format!(
            "🪙 Coins earned: {}    ⭐ XP earned: {}",
            result.coins_earned, result.xp_earned
        )),
    ];

    let summary = Paragraph::new(summary_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .alignment(Alignment::Center);

    f.render_widget(summary, chunks[1]);

    let options = ["Try Again", "Back to Puzzles"];
    let option_items: Vec<ListItem> = options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let style = if i == app.selected_menu_item {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if i == app.selected_menu_item { "► " } else { "  " };
            ListItem::new(Line::from(Span::styled(format!("{}{}", prefix, option), style)))
        })
        .collect();

    let option_list = List::new(option_items).block(
        Block::default()
            .title("What next?")
            .borders(Borders::ALL)
            .style(Style::default().fg(Color::White)),
    );

    f.render_widget(option_list, chunks[2]);

    let footer_text = "↑↓ Select  Enter Confirm  R Try Again  Esc Back to Puzzles";
    let footer = Paragraph::new(footer_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);

    f.render_widget(footer, chunks[3]);
}

fn draw_how_to_play(f: &mut Frame) {
    let size = f.area();

    let lines = vec![
        Line::from(""),
        Line::from("Every puzzle shows two columns that belong together."),
        Line::from(""),
        Line::from("1. Move with ↑↓ and hop between columns with ←→ or Tab"),
        Line::from("2. Press Enter to pick an item on each side"),
        Line::from("3. Press Space to lock the pair in"),
        Line::from(""),
        Line::from("A correct pair earns a point. Right or wrong, both items are"),
        Line::from("used up, so think before you lock in! Match 3 or more pairs"),
        Line::from("to pass and collect coins and XP for your run."),
        Line::from(""),
        Line::from("Press Esc to return to the menu"),
    ];

    let help = Paragraph::new(lines)
        .block(
            Block::default()
                .title("Match Quest - How to Play")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);

    f.render_widget(help, size);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn investment_puzzle() -> PuzzleDefinition {
        builtin_catalog()
            .into_iter()
            .find(|p| p.id == "investment-types")
            .expect("investment puzzle exists")
    }

    fn new_session(puzzle: PuzzleDefinition) -> MatchSession {
        MatchSession::new(puzzle).expect("puzzle should be valid")
    }

    fn play(session: &mut MatchSession, pairs: &[(u32, u32)]) {
        for &(left_id, right_id) in pairs {
            session.select(Side::Left, left_id);
            session.select(Side::Right, right_id);
            session.commit();
        }
    }

    // Commit every pair correctly, in match-table order
    fn play_perfectly(session: &mut MatchSession) {
        let pairs: Vec<(u32, u32)> = session
            .puzzle()
            .correct_matches
            .iter()
            .map(|m| (m.left_id, m.right_id))
            .collect();
        play(session, &pairs);
    }

    // Shift every left item onto its neighbor's partner: all wrong, each right used once
    fn deranged_pairs(puzzle: &PuzzleDefinition) -> Vec<(u32, u32)> {
        let n = puzzle.left_pool.len();
        (0..n)
            .map(|i| {
                let left_id = puzzle.left_pool[i].id;
                let neighbor = puzzle.left_pool[(i + 1) % n].id;
                let wrong_right = puzzle.partner_of(neighbor).expect("bijective table");
                (left_id, wrong_right)
            })
            .collect()
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), 6);

        for puzzle in &catalog {
            assert!(puzzle.validate().is_ok(), "puzzle {} should validate", puzzle.id);
            assert_eq!(puzzle.left_pool.len(), 5);
            assert_eq!(puzzle.right_pool.len(), 5);
            assert_eq!(puzzle.correct_matches.len(), 5);

            // Both projections of the match table cover their pools exactly
            let mut left_ids: Vec<u32> = puzzle.correct_matches.iter().map(|m| m.left_id).collect();
            let mut pool_left: Vec<u32> = puzzle.left_pool.iter().map(|item| item.id).collect();
            left_ids.sort_unstable();
            pool_left.sort_unstable();
            assert_eq!(left_ids, pool_left);

            let mut right_ids: Vec<u32> =
                puzzle.correct_matches.iter().map(|m| m.right_id).collect();
            let mut pool_right: Vec<u32> = puzzle.right_pool.iter().map(|item| item.id).collect();
            right_ids.sort_unstable();
            pool_right.sort_unstable();
            assert_eq!(right_ids, pool_right);
        }

        // Catalog ids are unique
        for (i, puzzle) in catalog.iter().enumerate() {
            assert!(!catalog[..i].iter().any(|other| other.id == puzzle.id));
        }
    }

    #[test]
    fn test_investment_pairs_match_the_lesson() {
        let puzzle = investment_puzzle();
        let expected = [
            ("Fixed Deposit", "Safe"),
            ("Stocks", "Risky"),
            ("Mutual Fund", "Diversified"),
            ("Bonds", "Stable"),
            ("Real Estate", "Long-term"),
        ];

        for (left_label, right_label) in expected {
            let left = puzzle
                .left_pool
                .iter()
                .find(|item| item.label == left_label)
                .expect("left item exists");
            let partner_id = puzzle.partner_of(left.id).expect("partner exists");
            let partner = puzzle
                .item(Side::Right, partner_id)
                .expect("partner in right pool");
            assert_eq!(partner.label, right_label);
        }
    }

    #[test]
    fn test_new_session_starts_idle() {
        let session = new_session(investment_puzzle());

        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.score(), 0);
        assert_eq!(session.max_score(), 5);
        assert_eq!(session.remaining(), 5);
        assert!(session.attempts().is_empty());
        assert!(!session.is_finished());
    }

    #[test]
    fn test_select_transitions() {
        let mut session = new_session(investment_puzzle());

        assert!(session.select(Side::Left, 1));
        assert_eq!(session.phase(), SessionPhase::LeftSelected);

        // Changing your mind replaces the selection
        assert!(session.select(Side::Left, 2));
        assert_eq!(session.selected(Side::Left), Some(2));

        assert!(session.select(Side::Right, 3));
        assert_eq!(session.phase(), SessionPhase::BothSelected);
        assert!(session.can_commit());
    }

    #[test]
    fn test_select_right_first() {
        let mut session = new_session(investment_puzzle());

        assert!(session.select(Side::Right, 4));
        assert_eq!(session.phase(), SessionPhase::RightSelected);
        assert!(!session.can_commit());
    }

    #[test]
    fn test_select_unknown_id_is_noop() {
        let mut session = new_session(investment_puzzle());

        assert!(!session.select(Side::Left, 99));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_commit_requires_both_sides() {
        let mut session = new_session(investment_puzzle());

        assert!(session.commit().is_none());

        session.select(Side::Left, 1);
        assert!(session.commit().is_none());
        assert!(session.attempts().is_empty());
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn test_correct_commit_increments_score() {
        let mut session = new_session(investment_puzzle());

        // Fixed Deposit pairs with Safe
        session.select(Side::Left, 1);
        session.select(Side::Right, 4);
        let attempt = session.commit().expect("commit should succeed");

        assert!(attempt.is_correct);
        assert_eq!(session.score(), 1);
        assert_eq!(session.phase(), SessionPhase::Idle); // selections cleared
        assert!(session.is_consumed(Side::Left, 1));
        assert!(session.is_consumed(Side::Right, 4));
    }

    #[test]
    fn test_incorrect_commit_keeps_score() {
        let mut session = new_session(investment_puzzle());

        // Fixed Deposit does not pair with Risky
        session.select(Side::Left, 1);
        session.select(Side::Right, 3);
        let attempt = session.commit().expect("commit should succeed");

        assert!(!attempt.is_correct);
        assert_eq!(session.score(), 0);
        assert_eq!(session.attempts().len(), 1);
        // Consumed win-or-lose
        assert!(session.is_consumed(Side::Left, 1));
        assert!(session.is_consumed(Side::Right, 3));
    }

    #[test]
    fn test_consumed_items_cannot_be_reselected() {
        let mut session = new_session(investment_puzzle());

        play(&mut session, &[(1, 4)]);

        assert!(!session.select(Side::Left, 1));
        assert!(!session.select(Side::Right, 4));
        assert_eq!(session.phase(), SessionPhase::Idle);

        // And no id ever shows up in two attempts
        play(&mut session, &[(2, 3), (3, 1), (4, 5), (5, 2)]);
        for (i, attempt) in session.attempts().iter().enumerate() {
            for other in &session.attempts()[..i] {
                assert_ne!(attempt.left_id, other.left_id);
                assert_ne!(attempt.right_id, other.right_id);
            }
        }
    }

    #[test]
    fn test_session_finishes_after_all_pairs() {
        let mut session = new_session(investment_puzzle());

        // A mix of right and wrong still terminates
        play(&mut session, &[(1, 4), (2, 1), (3, 3)]);
        assert!(!session.is_finished());
        assert_eq!(session.remaining(), 2);

        play(&mut session, &[(4, 5), (5, 2)]);
        assert!(session.is_finished());
        assert_eq!(session.phase(), SessionPhase::Finished);
        assert_eq!(session.remaining(), 0);
    }

    #[test]
    fn test_perfect_play_scores_full() {
        let mut session = new_session(investment_puzzle());

        play_perfectly(&mut session);

        assert_eq!(session.score(), 5);
        assert!(session.is_finished());

        let result = score_session(&session).expect("finished session scores");
        assert!(result.passed);
        assert!(result.perfect);
        assert_eq!(result.coins_earned, 125);
        assert_eq!(result.xp_earned, 50);
    }

    #[test]
    fn test_perfect_play_in_any_order() {
        let puzzle = investment_puzzle();
        let mut session = new_session(puzzle.clone());

        // Same correct pairs, committed back to front
        let mut pairs: Vec<(u32, u32)> = puzzle
            .correct_matches
            .iter()
            .map(|m| (m.left_id, m.right_id))
            .collect();
        pairs.reverse();
        play(&mut session, &pairs);

        assert_eq!(session.score(), 5);
        assert!(session.is_finished());
    }

    #[test]
    fn test_all_wrong_scores_zero() {
        let puzzle = investment_puzzle();
        let mut session = new_session(puzzle.clone());

        play(&mut session, &deranged_pairs(&puzzle));

        assert_eq!(session.score(), 0);
        assert!(session.is_finished());

        let result = score_session(&session).expect("finished session scores");
        assert!(!result.passed);
        assert!(!result.perfect);
        assert_eq!(result.coins_earned, 0);
        assert_eq!(result.xp_earned, 0);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let pairs = [(1, 3), (2, 3), (3, 1), (4, 2), (5, 5)];
        // (2,3) is dead because 3 is consumed by then; both runs must agree on that too
        let mut first = new_session(investment_puzzle());
        let mut second = new_session(investment_puzzle());

        play(&mut first, &pairs);
        play(&mut second, &pairs);

        assert_eq!(first.score(), second.score());
        assert_eq!(first.attempts(), second.attempts());
    }

    #[test]
    fn test_commit_after_finish_is_noop() {
        let mut session = new_session(investment_puzzle());
        play_perfectly(&mut session);

        assert!(!session.select(Side::Left, 1));
        assert!(session.commit().is_none());
        assert_eq!(session.attempts().len(), 5);
        assert_eq!(session.score(), 5);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut session = new_session(investment_puzzle());
        play(&mut session, &[(1, 4), (2, 1)]);

        session.reset();

        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.score(), 0);
        assert!(session.attempts().is_empty());
        assert!(!session.is_consumed(Side::Left, 1));
        assert!(!session.is_consumed(Side::Right, 4));
    }

    #[test]
    fn test_validation_rejects_size_mismatch() {
        let mut puzzle = investment_puzzle();
        puzzle.right_pool.pop();

        let err = puzzle.validate().expect_err("should reject mismatch");
        assert!(matches!(err, ConfigError::SizeMismatch { .. }));
        assert!(MatchSession::new(puzzle).is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_ids() {
        let mut puzzle = investment_puzzle();
        puzzle.right_pool[1].id = puzzle.right_pool[0].id;

        let err = puzzle.validate().expect_err("should reject duplicate");
        assert!(matches!(
            err,
            ConfigError::DuplicateItem { side: Side::Right, .. }
        ));
    }

    #[test]
    fn test_validation_rejects_double_match() {
        let mut puzzle = investment_puzzle();
        puzzle.correct_matches[1].left_id = puzzle.correct_matches[0].left_id;

        let err = puzzle.validate().expect_err("should reject double match");
        assert!(matches!(
            err,
            ConfigError::NotABijection { side: Side::Left, .. }
        ));
    }

    #[test]
    fn test_validation_rejects_unknown_match_id() {
        let mut puzzle = investment_puzzle();
        puzzle.correct_matches[0].right_id = 99;

        let err = puzzle.validate().expect_err("should reject unknown id");
        assert!(matches!(
            err,
            ConfigError::UnknownItem { side: Side::Right, id: 99 }
        ));
    }

    #[test]
    fn test_validation_rejects_empty_pool() {
        let mut puzzle = investment_puzzle();
        puzzle.left_pool.clear();
        puzzle.right_pool.clear();
        puzzle.correct_matches.clear();

        let err = puzzle.validate().expect_err("should reject empty pool");
        assert_eq!(err, ConfigError::EmptyPool);
    }

    #[test]
    fn test_aligned_order_matches_partners() {
        let puzzle = investment_puzzle();
        let aligned = aligned_right_order(&puzzle);

        for (i, left) in puzzle.left_pool.iter().enumerate() {
            let partner_id = puzzle.partner_of(left.id).expect("partner exists");
            assert_eq!(puzzle.right_pool[aligned[i]].id, partner_id);
        }
    }

    #[test]
    fn test_display_order_hides_the_pairing() {
        let puzzle = investment_puzzle();

        for seed in 0..20 {
            let order = display_order(&puzzle, seed);

            // A real permutation of the right pool
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

            // No row shows a right item on its partner's line
            for (i, left) in puzzle.left_pool.iter().enumerate() {
                let partner_id = puzzle.partner_of(left.id).expect("partner exists");
                assert_ne!(
                    puzzle.right_pool[order[i]].id, partner_id,
                    "seed {} leaks the pairing at row {}",
                    seed, i
                );
            }
        }
    }

    #[test]
    fn test_display_order_varies_with_seed() {
        let puzzle = investment_puzzle();
        assert_ne!(display_order(&puzzle, 0), display_order(&puzzle, 1));
    }

    #[test]
    fn test_scorer_waits_for_finish() {
        let mut session = new_session(investment_puzzle());
        assert!(score_session(&session).is_none());

        play(&mut session, &[(1, 4)]);
        assert!(score_session(&session).is_none());
    }

    #[test]
    fn test_scorer_pass_threshold() {
        // Three right and two wrong passes without perfection
        let mut session = new_session(investment_puzzle());
        play(&mut session, &[(1, 4), (2, 3), (3, 1), (4, 2), (5, 5)]);
        assert_eq!(session.score(), 3);

        let result = score_session(&session).expect("finished session scores");
        assert!(result.passed);
        assert!(!result.perfect);
        assert_eq!(result.coins_earned, 75);
        assert_eq!(result.xp_earned, 50);

        // Two right misses the threshold
        let mut session = new_session(investment_puzzle());
        play(&mut session, &[(1, 4), (2, 3), (3, 5), (4, 2), (5, 1)]);
        assert_eq!(session.score(), 2);

        let result = score_session(&session).expect("finished session scores");
        assert!(!result.passed);
        assert_eq!(result.coins_earned, 50);
        assert_eq!(result.xp_earned, 0);
    }

    #[test]
    fn test_pass_threshold_defaults_to_three() {
        let plan: RewardPlan = serde_json::from_str(
            r#"{"coins_per_level": 10, "total_coins": 50, "total_xp": 20}"#,
        )
        .expect("reward plan should parse");

        assert_eq!(plan.pass_threshold, 3);
    }

    #[test]
    fn test_puzzle_pack_json_round_trip() {
        let catalog = builtin_catalog();
        let json = serde_json::to_string(&catalog).expect("catalog should serialize");
        let parsed: Vec<PuzzleDefinition> =
            serde_json::from_str(&json).expect("catalog should parse back");

        assert_eq!(parsed, catalog);
        for puzzle in &parsed {
            assert!(puzzle.validate().is_ok());
        }
    }

    #[test]
    fn test_app_initialization() {
        let app = App::new(builtin_catalog());

        assert!(matches!(app.screen, Screen::MainMenu));
        assert_eq!(app.selected_menu_item, 0);
        assert!(!app.should_quit);
        assert!(app.active.is_none());
        assert_eq!(app.profile.coins, 0);
        assert_eq!(app.profile.xp, 0);
        assert_eq!(app.profile.puzzles_completed, 0);
    }

    #[test]
    fn test_start_puzzle_creates_session() {
        let mut app = App::new(builtin_catalog());
        app.screen = Screen::PuzzleSelect;

        app.start_puzzle(0);

        assert!(matches!(app.screen, Screen::Playing));
        let active = app.active.as_ref().expect("session started");
        assert_eq!(active.session.score(), 0);
        assert_eq!(active.display_order.len(), 5);
        assert_eq!(active.active_side, Side::Left);
    }

    #[test]
    fn test_reward_granted_once_at_reveal() {
        let mut app = App::new(builtin_catalog());
        app.start_puzzle(0);

        if let Some(active) = app.active.as_mut() {
            play_perfectly(&mut active.session);
        }
        app.reveal_results();

        assert!(matches!(app.screen, Screen::Results));
        assert_eq!(app.profile.coins, 125);
        assert_eq!(app.profile.xp, 50);
        assert_eq!(app.profile.puzzles_completed, 1);

        // A second reveal must not double-pay
        app.reveal_results();
        assert_eq!(app.profile.coins, 125);
        assert_eq!(app.profile.puzzles_completed, 1);
    }

    #[test]
    fn test_retry_resets_board() {
        let mut app = App::new(builtin_catalog());
        app.start_puzzle(0);

        if let Some(active) = app.active.as_mut() {
            play_perfectly(&mut active.session);
        }
        app.reveal_results();
        app.retry_session();

        assert!(matches!(app.screen, Screen::Playing));
        let active = app.active.as_ref().expect("session still active");
        assert_eq!(active.session.score(), 0);
        assert!(active.session.attempts().is_empty());
        assert!(active.result.is_none());
        assert!(active.reveal_at.is_none());
    }

    #[test]
    fn test_esc_abandons_session() {
        let mut app = App::new(builtin_catalog());
        app.start_puzzle(0);
        assert!(app.active.is_some());

        app.go_back();

        assert!(app.active.is_none());
        assert!(matches!(app.screen, Screen::PuzzleSelect));
    }

    #[test]
    fn test_commit_selected_records_feedback() {
        let mut app = App::new(builtin_catalog());
        app.start_puzzle(0);

        if let Some(active) = app.active.as_mut() {
            active.session.select(Side::Left, 1);
            active.session.select(Side::Right, 4);
        }
        app.commit_selected();

        let active = app.active.as_ref().expect("session active");
        let feedback = active.feedback.as_ref().expect("feedback pulse set");
        assert_eq!(feedback.kind, FeedbackKind::Correct);
        assert!(active.reveal_at.is_none()); // four pairs still open
        assert!(app
            .profile
            .recent_activities
            .first()
            .expect("activity logged")
            .starts_with("✅"));
    }

    #[test]
    fn test_finishing_arms_the_reveal_delay() {
        let mut app = App::new(builtin_catalog());
        app.start_puzzle(0);

        let pairs: Vec<(u32, u32)> = investment_puzzle()
            .correct_matches
            .iter()
            .map(|m| (m.left_id, m.right_id))
            .collect();
        for (left_id, right_id) in pairs {
            if let Some(active) = app.active.as_mut() {
                active.session.select(Side::Left, left_id);
                active.session.select(Side::Right, right_id);
            }
            app.commit_selected();
        }

        let active = app.active.as_ref().expect("session active");
        assert!(active.session.is_finished());
        assert!(active.reveal_at.is_some());
        assert!(matches!(app.screen, Screen::Playing)); // summary waits for the delay
    }
}
