//! Game session runtime.
//!
//! A [`GameSession`] drives the game and word state machines from
//! `vocab_core::game`, persists answers and the game log through the entity
//! store, and publishes every transition on a broadcast channel.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vocab_core::{
    grade_answer, GameAction, GameLogEntity, GameState, GradeResult, ReviewUnit, SearchOptions,
    SessionGoal, StateChange, StopReason, WordAction, WordEntity, WordState,
};

use crate::error::{Result, StoreError};
use crate::search::SchedulingEngine;
use crate::store::EntityStore;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub options: SearchOptions,
    pub goal: SessionGoal,
    /// Period of the goal/ping ticker.
    pub tick: Duration,
    /// Started time between two game log writes.
    pub ping_interval: Duration,
    /// Seconds before a wrongly answered unit comes back.
    pub rebuffer_secs: RangeInclusive<u64>,
}

impl SessionConfig {
    pub fn new(options: SearchOptions) -> Self {
        Self {
            options,
            goal: SessionGoal::Unlimited,
            tick: Duration::from_millis(500),
            ping_interval: Duration::from_secs(10),
            rebuffer_secs: 30..=120,
        }
    }

    pub fn with_goal(mut self, goal: SessionGoal) -> Self {
        self.goal = goal;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    GameStateChanged(StateChange<GameState>),
    WordStateChanged(StateChange<WordState>),
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot<U> {
    pub game_state: GameState,
    pub word_state: WordState,
    pub current: Option<U>,
    pub log: Option<GameLogEntity>,
    pub answered: u32,
    pub elapsed_millis: u64,
    pub buffered: usize,
    /// Every remaining unit is a wrong answer that is not due yet.
    pub waiting: bool,
    /// Why the last `start_game` was refused.
    pub failure: Option<String>,
}

/// Outcome of looking for the next unit.
enum Candidate<U> {
    Ready(U),
    /// Only buffered units are left and none is due yet.
    Waiting,
    Exhausted,
}

struct Buffered<U> {
    unit: U,
    due: Instant,
}

struct SessionInner<U> {
    game_state: GameState,
    word_state: WordState,
    current: Option<U>,
    log: Option<GameLogEntity>,
    /// Started time folded in at the last pause.
    elapsed: Duration,
    resumed_at: Option<Instant>,
    last_ping: Duration,
    answered: u32,
    buffer: Vec<Buffered<U>>,
    waiting: bool,
    solved: HashSet<String>,
    failure: Option<String>,
    ticker: Option<JoinHandle<()>>,
}

impl<U> Default for SessionInner<U> {
    fn default() -> Self {
        Self {
            game_state: GameState::Undefined,
            word_state: WordState::Undefined,
            current: None,
            log: None,
            elapsed: Duration::ZERO,
            resumed_at: None,
            last_ping: Duration::ZERO,
            answered: 0,
            buffer: Vec::new(),
            waiting: false,
            solved: HashSet::new(),
            failure: None,
            ticker: None,
        }
    }
}

impl<U> SessionInner<U> {
    fn elapsed(&self) -> Duration {
        self.elapsed + self.resumed_at.map_or(Duration::ZERO, |at| at.elapsed())
    }

    fn fold_elapsed(&mut self) {
        if let Some(at) = self.resumed_at.take() {
            self.elapsed += at.elapsed();
        }
    }
}

struct SessionShared<U> {
    store: EntityStore,
    engine: SchedulingEngine,
    config: SessionConfig,
    inner: Mutex<SessionInner<U>>,
    events: broadcast::Sender<SessionEvent>,
}

/// One review session over units of type `U`.
pub struct GameSession<U> {
    shared: Arc<SessionShared<U>>,
}

impl<U> Clone for GameSession<U> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<U: ReviewUnit> GameSession<U> {
    pub fn new(store: EntityStore, engine: SchedulingEngine, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(SessionShared {
                store,
                engine,
                config,
                inner: Mutex::new(SessionInner::default()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Open a game log, present the first unit and start the ticker.
    ///
    /// Invalid search options leave the game untouched; the error is kept as
    /// the snapshot's `failure`.
    pub async fn start_game(&self) -> Result<U> {
        let mut inner = self.shared.inner.lock().await;
        let next = inner.game_state.apply(GameAction::Start)?;
        if let Err(err) = self.shared.config.options.validate() {
            let err = StoreError::from(err);
            warn!("game not started: {}", err);
            inner.failure = Some(err.to_string());
            return Err(err);
        }

        let log = GameLogEntity::start(self.shared.config.options.mode, Utc::now());
        let log = self.shared.store.create(log)?;
        info!(log = %log.id, mode = self.shared.config.options.mode.as_str(), "game started");

        let ticker = inner.ticker.take();
        *inner = SessionInner {
            game_state: inner.game_state,
            word_state: inner.word_state,
            log: Some(log),
            resumed_at: Some(Instant::now()),
            ..SessionInner::default()
        };
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        self.set_game(&mut inner, next);

        let Candidate::Ready(unit) = self.fetch_candidate(&mut inner)? else {
            self.stop_locked(&mut inner, StopReason::NoMoreWords)?;
            return Err(StoreError::NoCandidates);
        };
        self.present(&mut inner, unit.clone())?;
        inner.ticker = Some(self.spawn_ticker());
        Ok(unit)
    }

    pub async fn pause_game(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let next = inner.game_state.apply(GameAction::Pause)?;
        inner.fold_elapsed();
        self.write_log(&mut inner, None)?;
        self.set_game(&mut inner, next);
        Ok(())
    }

    pub async fn resume_game(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let next = inner.game_state.apply(GameAction::Resume)?;
        inner.resumed_at = Some(Instant::now());
        self.set_game(&mut inner, next);
        Ok(())
    }

    pub async fn stop_game(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.stop_locked(&mut inner, StopReason::Stopped)
    }

    pub async fn cover_word(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let next = inner.word_state.apply(WordAction::Cover, inner.game_state)?;
        self.set_word(&mut inner, next);
        Ok(())
    }

    pub async fn uncover_word(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let next = inner.word_state.apply(WordAction::Uncover, inner.game_state)?;
        self.set_word(&mut inner, next);
        Ok(())
    }

    /// Record a correct answer for the uncovered unit.
    pub async fn solve_word_correct(&self, answer: Option<String>) -> Result<WordEntity> {
        let mut inner = self.shared.inner.lock().await;
        self.solve(&mut inner, true, answer)
    }

    /// Record a wrong answer; the unit comes back later in this session.
    pub async fn solve_word_wrong(&self, answer: Option<String>) -> Result<WordEntity> {
        let mut inner = self.shared.inner.lock().await;
        self.solve(&mut inner, false, answer)
    }

    /// Present the next unit.
    ///
    /// Returns `None` while only not yet due wrong answers remain; the ticker
    /// presents them once due. Stops with `no-more-words` when nothing is left.
    pub async fn next_word(&self) -> Result<Option<U>> {
        let mut inner = self.shared.inner.lock().await;
        if inner.game_state != GameState::Started {
            return Err(StoreError::InvalidTransition {
                action: "present a word".into(),
                state: inner.game_state.to_string(),
            });
        }
        if let Some(reason) = self.goal_reached(&inner) {
            self.stop_locked(&mut inner, reason)?;
            return Ok(None);
        }
        match self.fetch_candidate(&mut inner)? {
            Candidate::Ready(unit) => {
                self.present(&mut inner, unit.clone())?;
                Ok(Some(unit))
            }
            Candidate::Waiting => {
                inner.current = None;
                inner.waiting = true;
                Ok(None)
            }
            Candidate::Exhausted => {
                self.stop_locked(&mut inner, StopReason::NoMoreWords)?;
                Ok(None)
            }
        }
    }

    /// Grade a typed answer against the current unit without recording it.
    pub async fn grade_answer(&self, typed: &str) -> Result<GradeResult> {
        let inner = self.shared.inner.lock().await;
        let current = inner.current.as_ref().ok_or_else(|| StoreError::InvalidTransition {
            action: "grade".into(),
            state: inner.word_state.to_string(),
        })?;
        Ok(grade_answer(typed, &current.expected_answer()))
    }

    /// Check goals, present a waiting unit once due and write a log ping;
    /// called by the ticker.
    pub async fn tick(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.game_state != GameState::Started {
            return Ok(());
        }
        if let Some(reason) = self.goal_reached(&inner) {
            return self.stop_locked(&mut inner, reason);
        }
        if inner.waiting {
            match self.fetch_candidate(&mut inner)? {
                Candidate::Ready(unit) => self.present(&mut inner, unit)?,
                Candidate::Waiting => {}
                Candidate::Exhausted => return self.stop_locked(&mut inner, StopReason::NoMoreWords),
            }
        }
        let elapsed = inner.elapsed();
        if elapsed.saturating_sub(inner.last_ping) >= self.shared.config.ping_interval {
            inner.last_ping = elapsed;
            self.write_log(&mut inner, None)?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> SessionSnapshot<U> {
        let inner = self.shared.inner.lock().await;
        SessionSnapshot {
            game_state: inner.game_state,
            word_state: inner.word_state,
            current: inner.current.clone(),
            log: inner.log.clone(),
            answered: inner.answered,
            elapsed_millis: inner.elapsed().as_millis() as u64,
            buffered: inner.buffer.len(),
            waiting: inner.waiting,
            failure: inner.failure.clone(),
        }
    }

    fn solve(&self, inner: &mut SessionInner<U>, correct: bool, answer: Option<String>) -> Result<WordEntity> {
        let next = inner.word_state.apply(WordAction::Solve, inner.game_state)?;
        let unit = inner.current.clone().ok_or_else(|| StoreError::InvalidTransition {
            action: "solve".into(),
            state: inner.word_state.to_string(),
        })?;

        let now = Utc::now();
        let mut word: WordEntity = self.shared.store.get_by_id(unit.doc_id())?;
        unit.apply_answer(
            &mut word,
            self.shared.config.options.mode,
            correct,
            answer.as_deref(),
            now,
        )?;
        let word = self.shared.store.update(word)?;

        inner.answered += 1;
        if let Some(log) = inner.log.as_mut() {
            log.count_total += 1;
            if correct {
                log.count_correct += 1;
            } else {
                log.count_wrong += 1;
            }
        }
        if correct {
            inner.solved.insert(unit.key());
        } else {
            let secs = rand::thread_rng().gen_range(self.shared.config.rebuffer_secs.clone());
            debug!(unit = %unit.key(), secs, "re-buffering wrong answer");
            inner.buffer.push(Buffered {
                unit,
                due: Instant::now() + Duration::from_secs(secs),
            });
        }
        self.write_log(inner, None)?;
        self.set_word(inner, next);

        if let Some(reason) = self.goal_reached(inner) {
            self.stop_locked(inner, reason)?;
        }
        Ok(word)
    }

    /// Due buffered units first, then the scheduling engine.
    fn fetch_candidate(&self, inner: &mut SessionInner<U>) -> Result<Candidate<U>> {
        let now = Instant::now();
        let due = inner
            .buffer
            .iter()
            .enumerate()
            .filter(|(_, buffered)| buffered.due <= now)
            .min_by_key(|(_, buffered)| buffered.due)
            .map(|(index, _)| index);
        if let Some(index) = due {
            return Ok(Candidate::Ready(inner.buffer.remove(index).unit));
        }

        let mut exclude = inner.solved.clone();
        exclude.extend(inner.buffer.iter().map(|buffered| buffered.unit.key()));
        exclude.extend(inner.current.iter().map(|unit| unit.key()));
        let found = self.shared.engine.search_excluding::<U>(
            &self.shared.config.options,
            Utc::now(),
            Some(1),
            &exclude,
        )?;
        Ok(match found.into_iter().next() {
            Some(unit) => Candidate::Ready(unit),
            None if inner.buffer.is_empty() => Candidate::Exhausted,
            None => Candidate::Waiting,
        })
    }

    fn present(&self, inner: &mut SessionInner<U>, unit: U) -> Result<()> {
        let next = inner.word_state.apply(WordAction::Present, inner.game_state)?;
        debug!(unit = %unit.key(), "presenting");
        inner.current = Some(unit);
        inner.waiting = false;
        self.set_word(inner, next);
        Ok(())
    }

    fn stop_locked(&self, inner: &mut SessionInner<U>, reason: StopReason) -> Result<()> {
        let next = inner.game_state.apply(GameAction::Stop(reason))?;
        inner.fold_elapsed();
        self.write_log(inner, Some(Utc::now()))?;
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
        inner.current = None;
        inner.waiting = false;
        let cleared = inner.word_state.apply(WordAction::Clear, next)?;
        self.set_word(inner, cleared);
        self.set_game(inner, next);
        info!(reason = reason.as_str(), answered = inner.answered, "game stopped");
        Ok(())
    }

    fn goal_reached(&self, inner: &SessionInner<U>) -> Option<StopReason> {
        self.shared.config.goal.reached(inner.elapsed(), inner.answered)
    }

    fn write_log(&self, inner: &mut SessionInner<U>, end_time: Option<chrono::DateTime<Utc>>) -> Result<()> {
        let elapsed = inner.elapsed();
        let Some(mut log) = inner.log.take() else {
            return Ok(());
        };
        log.duration_in_millis = elapsed.as_millis() as i64;
        if end_time.is_some() {
            log.end_time = end_time;
        }
        match self.shared.store.update(log.clone()) {
            Ok(written) => {
                inner.log = Some(written);
                Ok(())
            }
            Err(err) => {
                inner.log = Some(log);
                Err(err)
            }
        }
    }

    fn set_game(&self, inner: &mut SessionInner<U>, current: GameState) {
        let previous = std::mem::replace(&mut inner.game_state, current);
        if previous != current {
            let _ = self
                .shared
                .events
                .send(SessionEvent::GameStateChanged(StateChange { previous, current }));
        }
    }

    fn set_word(&self, inner: &mut SessionInner<U>, current: WordState) {
        let previous = std::mem::replace(&mut inner.word_state, current);
        if previous != current {
            let _ = self
                .shared
                .events
                .send(SessionEvent::WordStateChanged(StateChange { previous, current }));
        }
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let weak: Weak<SessionShared<U>> = Arc::downgrade(&self.shared);
        let period = self.shared.config.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let session = GameSession { shared };
                if let Err(err) = session.tick().await {
                    warn!("session tick failed: {}", err);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{ProgressHandle, ViewMaterializer};
    use vocab_core::types::TAG_TEXT;
    use vocab_core::{
        DialogTextSearchResult, GameMode, Grade, LanguageDirection, SearchResult, Text,
        NEVER_ANSWERED,
    };

    fn session_for<U: ReviewUnit>(
        options: SearchOptions,
        goal: SessionGoal,
        words: Vec<WordEntity>,
    ) -> GameSession<U> {
        let store = EntityStore::open_in_memory().unwrap();
        for word in words {
            store.create(word).unwrap();
        }
        let views = ViewMaterializer::new(store.repository().clone(), ProgressHandle::default());
        let engine = SchedulingEngine::new(store.clone(), views);
        GameSession::new(store, engine, SessionConfig::new(options).with_goal(goal))
    }

    fn nouns(words: &[(&str, &str)]) -> Vec<WordEntity> {
        words
            .iter()
            .map(|(en, de)| WordEntity::new("noun", vec![Text::from_pairs([("en", *en), ("de", *de)])]))
            .collect()
    }

    fn session_with(goal: SessionGoal, words: &[(&str, &str)]) -> GameSession<SearchResult> {
        session_for(SearchOptions::new(GameMode::Type, "en", "de"), goal, nouns(words))
    }

    #[tokio::test]
    async fn empty_store_stops_with_no_more_words() {
        let session = session_with(SessionGoal::Unlimited, &[]);
        let err = session.start_game().await.unwrap_err();
        assert!(matches!(err, StoreError::NoCandidates));
        let snapshot = session.snapshot().await;
        assert_eq!(
            snapshot.game_state,
            GameState::Stopped { reason: StopReason::NoMoreWords }
        );
        assert!(snapshot.log.unwrap().end_time.is_some());
    }

    #[tokio::test]
    async fn correct_answer_moves_sentinel_to_zero() {
        let session = session_with(SessionGoal::Unlimited, &[("dog", "Hund")]);
        let unit = session.start_game().await.unwrap();
        assert_eq!(unit.answer_level, NEVER_ANSWERED);
        assert_eq!(session.snapshot().await.word_state, WordState::Covered);

        let err = session.solve_word_wrong(None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        session.uncover_word().await.unwrap();
        let word = session
            .solve_word_correct(Some(unit.answer.clone()))
            .await
            .unwrap();
        let progress = word.texts[0]
            .word(&unit.answer_language)
            .unwrap()
            .progress(GameMode::Type)
            .unwrap();
        assert_eq!(progress.level, 0);
        assert_eq!(progress.correct, Some(true));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.word_state, WordState::Solved);
        let log = snapshot.log.unwrap();
        assert_eq!((log.count_total, log.count_correct, log.count_wrong), (1, 1, 0));

        let next = session.next_word().await.unwrap().unwrap();
        assert_ne!(next.key(), unit.key());
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_answer_comes_back_after_its_delay() {
        let options =
            SearchOptions::new(GameMode::Type, "en", "de").with_direction(LanguageDirection::Target);
        let session: GameSession<SearchResult> =
            session_for(options, SessionGoal::Unlimited, nouns(&[("dog", "Hund")]));
        let unit = session.start_game().await.unwrap();
        session.uncover_word().await.unwrap();
        let word = session.solve_word_wrong(Some("Hunt".into())).await.unwrap();
        let translated = word.texts[0].word(&unit.answer_language).unwrap();
        assert_eq!(translated.level(GameMode::Type), 0);

        // Nothing else is due: the game waits instead of repeating the unit at once.
        assert!(session.next_word().await.unwrap().is_none());
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.game_state, GameState::Started);
        assert_eq!(snapshot.word_state, WordState::Solved);
        assert!(snapshot.current.is_none());
        assert!(snapshot.waiting);
        assert_eq!(snapshot.buffered, 1);

        tokio::time::advance(Duration::from_secs(20)).await;
        session.tick().await.unwrap();
        assert!(session.snapshot().await.current.is_none());

        tokio::time::advance(Duration::from_secs(101)).await;
        session.tick().await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.current.map(|unit| unit.key()), Some(unit.key()));
        assert_eq!(snapshot.word_state, WordState::Covered);
        assert_eq!(snapshot.buffered, 0);
        assert!(!snapshot.waiting);

        session.uncover_word().await.unwrap();
        session.solve_word_correct(None).await.unwrap();
        assert!(session.next_word().await.unwrap().is_none());
        assert_eq!(
            session.snapshot().await.game_state,
            GameState::Stopped { reason: StopReason::NoMoreWords }
        );
    }

    #[tokio::test]
    async fn other_due_units_come_before_a_buffered_one() {
        let session = session_with(SessionGoal::Unlimited, &[("dog", "Hund")]);
        let unit = session.start_game().await.unwrap();
        session.uncover_word().await.unwrap();
        session.solve_word_wrong(None).await.unwrap();
        assert_eq!(session.snapshot().await.buffered, 1);

        let second = session.next_word().await.unwrap().unwrap();
        assert_ne!(second.key(), unit.key());
        session.uncover_word().await.unwrap();
        session.solve_word_correct(None).await.unwrap();
        assert!(session.next_word().await.unwrap().is_none());
        assert!(session.snapshot().await.waiting);
    }

    #[tokio::test]
    async fn invalid_options_keep_the_reason() {
        let session: GameSession<SearchResult> = session_for(
            SearchOptions::new(GameMode::Type, "en", "en"),
            SessionGoal::Unlimited,
            nouns(&[("dog", "Hund")]),
        );
        let err = session.start_game().await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.game_state, GameState::Undefined);
        assert!(snapshot.log.is_none());
        assert!(snapshot.failure.unwrap().contains("en"));
    }

    #[tokio::test]
    async fn solving_a_dialog_answers_every_line() {
        let dialog = WordEntity::new(
            "dialog",
            vec![
                Text::from_pairs([("en", "Hello"), ("de", "Hallo")]).with_tag(TAG_TEXT),
                Text::from_pairs([("en", "How are you?"), ("de", "Wie geht's?")]).with_tag(TAG_TEXT),
                Text::from_pairs([("en", "greeting"), ("de", "Gruß")]),
            ],
        );
        let session: GameSession<DialogTextSearchResult> = session_for(
            SearchOptions::new(GameMode::Dialog, "en", "de"),
            SessionGoal::Unlimited,
            vec![dialog],
        );
        let unit = session.start_game().await.unwrap();
        assert_eq!(unit.lines.len(), 2);
        assert_eq!(unit.answer_level, NEVER_ANSWERED);

        session.uncover_word().await.unwrap();
        let word = session.solve_word_correct(None).await.unwrap();
        let levels: Vec<i32> = word
            .texts
            .iter()
            .filter(|text| text.is_dialog_line())
            .map(|text| text.word(&unit.answer_language).unwrap().level(GameMode::Dialog))
            .collect();
        assert_eq!(levels, vec![0, 0]);
        assert_eq!(
            word.texts[2].word(&unit.answer_language).unwrap().level(GameMode::Dialog),
            NEVER_ANSWERED
        );
    }

    #[tokio::test]
    async fn pause_and_resume_are_guarded() {
        let session = session_with(SessionGoal::Unlimited, &[("dog", "Hund")]);
        assert!(session.pause_game().await.is_err());
        session.start_game().await.unwrap();
        session.pause_game().await.unwrap();
        let err = session.pause_game().await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert!(session.uncover_word().await.is_err());
        session.resume_game().await.unwrap();
        session.stop_game().await.unwrap();
        assert!(session.stop_game().await.is_err());
    }

    #[tokio::test]
    async fn amount_goal_stops_the_game() {
        let session = session_with(SessionGoal::ByAmount { count: 1 }, &[("dog", "Hund")]);
        session.start_game().await.unwrap();
        session.uncover_word().await.unwrap();
        session.solve_word_correct(None).await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(
            snapshot.game_state,
            GameState::Stopped { reason: StopReason::ReachedAmount }
        );
        assert!(snapshot.current.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn time_goal_is_checked_on_tick() {
        let session = session_with(SessionGoal::ByTime { minutes: 1 }, &[("dog", "Hund")]);
        session.start_game().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        session.tick().await.unwrap();
        assert_eq!(
            session.snapshot().await.game_state,
            GameState::Stopped { reason: StopReason::ReachedMinutes }
        );
    }

    #[tokio::test]
    async fn transitions_are_published() {
        let session = session_with(SessionGoal::Unlimited, &[("dog", "Hund")]);
        let mut events = session.subscribe();
        session.start_game().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::GameStateChanged(StateChange {
                previous: GameState::Undefined,
                current: GameState::Started,
            })
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::WordStateChanged(StateChange {
                previous: WordState::Undefined,
                current: WordState::Covered,
            })
        );
    }

    #[tokio::test]
    async fn typed_answers_are_graded() {
        let session = session_with(SessionGoal::Unlimited, &[("house", "Haus")]);
        let unit = session.start_game().await.unwrap();
        let exact = session.grade_answer(&unit.answer.to_uppercase()).await.unwrap();
        assert_eq!(exact.grade, Grade::Correct);
        let wrong = session.grade_answer("xyzxyzxyz").await.unwrap();
        assert_eq!(wrong.grade, Grade::Wrong);
    }
}
