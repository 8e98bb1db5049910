use std::collections::VecDeque;

use thiserror::Error;

use crate::engine::timers::Millis;
use crate::model::message::Speaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceTicket(pub u64);

/// Speech synthesis collaborator. Playback ends are reported back through
/// [`NarrationChannel::voice_finished`].
pub trait Voice: Send {
    /// `None` when speech is unavailable; the line then runs text-only.
    fn speak(&mut self, text: &str, profile: &str) -> Option<VoiceTicket>;
    fn cancel(&mut self, ticket: VoiceTicket);
}

/// No speech at all.
pub struct SilentVoice;

impl Voice for SilentVoice {
    fn speak(&mut self, _text: &str, _profile: &str) -> Option<VoiceTicket> {
        None
    }

    fn cancel(&mut self, _ticket: VoiceTicket) {}
}

/// What happens once a line has been fully presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Wait for `proceed()` or a second `skip()`.
    UntilContinue,
    /// Release the channel on its own after this long.
    For(Millis),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SayOptions {
    pub voice: bool,
    pub queued: bool,
    pub hold: Hold,
}

impl Default for SayOptions {
    fn default() -> Self {
        Self {
            voice: true,
            queued: false,
            hold: Hold::UntilContinue,
        }
    }
}

impl SayOptions {
    pub fn queued() -> Self {
        Self {
            queued: true,
            ..Self::default()
        }
    }

    pub fn hold_for(mut self, millis: Millis) -> Self {
        self.hold = Hold::For(millis);
        self
    }

    pub fn without_voice(mut self) -> Self {
        self.voice = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Choice(Vec<String>),
    Typed,
    Voice,
}

impl InputMode {
    fn label(&self) -> &'static str {
        match self {
            InputMode::Choice(_) => "choice",
            InputMode::Typed => "typed",
            InputMode::Voice => "voice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    Choice { index: usize, label: String },
    Text(String),
    Voice(String),
}

impl PlayerInput {
    /// The words the player said or picked.
    pub fn text(&self) -> &str {
        match self {
            PlayerInput::Choice { label, .. } => label,
            PlayerInput::Text(text) | PlayerInput::Voice(text) => text,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputRejected {
    #[error("no input is open")]
    NotOpen,

    #[error("input is open for {active} entry, not {attempted}")]
    WrongMode {
        active: &'static str,
        attempted: &'static str,
    },

    #[error("there is no option {0}")]
    NoSuchOption(usize),

    #[error("input is empty")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Typing,
    AwaitingContinue,
    AwaitingInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationEvent {
    SpeakerChanged(Speaker),
    LineStarted {
        token: LineToken,
        speaker: Speaker,
        text: String,
    },
    /// Text fully shown and voice done (or skipped).
    LinePresented { token: LineToken },
    /// The line released the channel.
    LineEnded { token: LineToken, interrupted: bool },
    ThinkingShown,
    InputOpened(InputMode),
    InputClosed,
    InputSubmitted(PlayerInput),
}

#[derive(Debug)]
struct QueuedLine {
    token: LineToken,
    text: String,
    speaker: Speaker,
    options: SayOptions,
}

#[derive(Debug)]
struct Line {
    token: LineToken,
    text: String,
    chars: usize,
    options: SayOptions,
    started_at: Millis,
    revealed: usize,
    voice: Option<VoiceTicket>,
    presented_at: Option<Millis>,
}

#[derive(Debug)]
struct InputSlot {
    mode: InputMode,
    open: bool,
}

/// The single shared text/voice surface.
///
/// Never presents two lines at once. Queued lines run strictly FIFO;
/// non-queued lines cut in immediately.
pub struct NarrationChannel {
    voice: Box<dyn Voice>,
    typing_interval: Millis,
    current: Option<Line>,
    queue: VecDeque<QueuedLine>,
    input: Option<InputSlot>,
    thinking: bool,
    speaker: Option<Speaker>,
    shown: String,
    events: Vec<NarrationEvent>,
    next_token: u64,
}

impl NarrationChannel {
    pub fn new(voice: Box<dyn Voice>, typing_interval: Millis) -> Self {
        Self {
            voice,
            typing_interval,
            current: None,
            queue: VecDeque::new(),
            input: None,
            thinking: false,
            speaker: None,
            shown: String::new(),
            events: Vec::new(),
            next_token: 1,
        }
    }

    pub fn silent(typing_interval: Millis) -> Self {
        Self::new(Box::new(SilentVoice), typing_interval)
    }

    pub fn say(
        &mut self,
        now: Millis,
        text: impl Into<String>,
        speaker: Speaker,
        options: SayOptions,
    ) -> LineToken {
        let token = LineToken(self.next_token);
        self.next_token += 1;
        let text = text.into();

        let busy = self.current.is_some() || self.input_is_open() || !self.queue.is_empty();
        if options.queued && busy {
            tracing::debug!(token = token.0, speaker = %speaker, "line queued");
            self.queue.push_back(QueuedLine {
                token,
                text,
                speaker,
                options,
            });
            return token;
        }

        if !options.queued {
            if self.current.is_some() {
                tracing::debug!(speaker = %speaker, "preempting current line");
                self.interrupt();
            }
            self.cancel_input();
        }

        self.start_line(now, token, text, speaker, options);
        self.update(now);
        token
    }

    fn start_line(
        &mut self,
        now: Millis,
        token: LineToken,
        text: String,
        speaker: Speaker,
        options: SayOptions,
    ) {
        self.thinking = false;

        if self.speaker.as_ref() != Some(&speaker) {
            self.speaker = Some(speaker.clone());
            self.events.push(NarrationEvent::SpeakerChanged(speaker.clone()));
        }

        let voice = if options.voice {
            let spoken = speakable_text(&text, &speaker);
            if spoken.is_empty() {
                None
            } else {
                self.voice.speak(&spoken, &speaker.voice_profile())
            }
        } else {
            None
        };

        self.events.push(NarrationEvent::LineStarted {
            token,
            speaker,
            text: text.clone(),
        });

        self.current = Some(Line {
            token,
            chars: text.chars().count(),
            text,
            options,
            started_at: now,
            revealed: 0,
            voice,
            presented_at: None,
        });
    }

    /// Advances typing, holds and the queue.
    pub fn update(&mut self, now: Millis) {
        loop {
            if let Some(line) = self.current.as_mut() {
                if line.presented_at.is_none() {
                    line.revealed = if self.typing_interval == 0 {
                        line.chars
                    } else {
                        let elapsed = now.saturating_sub(line.started_at);
                        line.chars.min((elapsed / self.typing_interval) as usize)
                    };

                    if line.revealed == line.chars && line.voice.is_none() {
                        line.presented_at = Some(now);
                        let token = line.token;
                        self.events.push(NarrationEvent::LinePresented { token });
                    } else {
                        return;
                    }
                }

                let (hold, presented_at) = (line.options.hold, line.presented_at.unwrap_or(now));
                let input_waiting = self.input.as_ref().is_some_and(|slot| !slot.open);

                let release = input_waiting
                    || match hold {
                        Hold::UntilContinue => false,
                        Hold::For(millis) => now >= presented_at + millis,
                    };
                if !release {
                    return;
                }
                self.end_line(false);
            }

            if self.input_is_open() {
                return;
            }

            if let Some(slot) = self.input.as_mut() {
                slot.open = true;
                let mode = slot.mode.clone();
                self.events.push(NarrationEvent::InputOpened(mode));
                return;
            }

            let Some(next) = self.queue.pop_front() else {
                return;
            };
            self.start_line(now, next.token, next.text, next.speaker, next.options);
        }
    }

    fn end_line(&mut self, interrupted: bool) {
        let Some(line) = self.current.take() else {
            return;
        };
        if let Some(ticket) = line.voice {
            self.voice.cancel(ticket);
        }
        self.shown = line.text.chars().take(line.revealed).collect();
        self.events.push(NarrationEvent::LineEnded {
            token: line.token,
            interrupted,
        });
    }

    /// First press shows the whole line and stops the voice; a second press
    /// continues.
    pub fn skip(&mut self, now: Millis) -> bool {
        let Some(line) = self.current.as_mut() else {
            return false;
        };

        if line.presented_at.is_some() {
            self.end_line(false);
            self.update(now);
            return true;
        }

        line.revealed = line.chars;
        if let Some(ticket) = line.voice.take() {
            self.voice.cancel(ticket);
        }
        line.presented_at = Some(now);
        let token = line.token;
        self.events.push(NarrationEvent::LinePresented { token });
        self.update(now);
        true
    }

    /// Continues past a fully presented line. Ignored while still typing.
    pub fn proceed(&mut self, now: Millis) -> bool {
        if !self
            .current
            .as_ref()
            .is_some_and(|line| line.presented_at.is_some())
        {
            return false;
        }
        self.end_line(false);
        self.update(now);
        true
    }

    /// Stops the current line where it is. Queued lines stay queued.
    pub fn interrupt(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.end_line(true);
        true
    }

    pub fn voice_finished(&mut self, ticket: VoiceTicket, completed_naturally: bool) {
        let Some(line) = self.current.as_mut() else {
            return;
        };
        if line.voice != Some(ticket) {
            return;
        }
        if !completed_naturally {
            tracing::debug!(ticket = ticket.0, "voice ended early");
        }
        line.voice = None;
    }

    /// Switches input on. Waits for the current line to finish presenting;
    /// any other mode in use is cancelled.
    pub fn request_input(&mut self, now: Millis, mode: InputMode) {
        self.cancel_input();
        self.thinking = false;
        self.input = Some(InputSlot { mode, open: false });
        self.update(now);
    }

    /// Swaps typed entry for voice capture and back.
    pub fn toggle_voice_capture(&mut self) -> Option<InputMode> {
        let slot = self.input.as_mut()?;
        let next = match slot.mode {
            InputMode::Typed => InputMode::Voice,
            InputMode::Voice => InputMode::Typed,
            InputMode::Choice(_) => return None,
        };
        slot.mode = next.clone();
        if slot.open {
            self.events.push(NarrationEvent::InputOpened(next.clone()));
        }
        Some(next)
    }

    pub fn cancel_input(&mut self) {
        if let Some(slot) = self.input.take() {
            if slot.open {
                self.events.push(NarrationEvent::InputClosed);
            }
        }
    }

    pub fn submit_text(&mut self, now: Millis, text: &str) -> Result<PlayerInput, InputRejected> {
        self.expect_mode("typed", |mode| matches!(mode, InputMode::Typed))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(InputRejected::Empty);
        }
        Ok(self.accept(now, PlayerInput::Text(text.to_string())))
    }

    pub fn submit_voice(&mut self, now: Millis, text: &str) -> Result<PlayerInput, InputRejected> {
        self.expect_mode("voice", |mode| matches!(mode, InputMode::Voice))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(InputRejected::Empty);
        }
        Ok(self.accept(now, PlayerInput::Voice(text.to_string())))
    }

    pub fn select_option(&mut self, now: Millis, index: usize) -> Result<PlayerInput, InputRejected> {
        self.expect_mode("choice", |mode| matches!(mode, InputMode::Choice(_)))?;
        let label = match self.input.as_ref().map(|slot| &slot.mode) {
            Some(InputMode::Choice(options)) => options
                .get(index)
                .cloned()
                .ok_or(InputRejected::NoSuchOption(index))?,
            _ => return Err(InputRejected::NotOpen),
        };
        Ok(self.accept(now, PlayerInput::Choice { index, label }))
    }

    fn expect_mode(
        &self,
        attempted: &'static str,
        accepts: impl Fn(&InputMode) -> bool,
    ) -> Result<(), InputRejected> {
        match &self.input {
            Some(slot) if slot.open => {
                if accepts(&slot.mode) {
                    Ok(())
                } else {
                    Err(InputRejected::WrongMode {
                        active: slot.mode.label(),
                        attempted,
                    })
                }
            }
            _ => Err(InputRejected::NotOpen),
        }
    }

    fn accept(&mut self, now: Millis, input: PlayerInput) -> PlayerInput {
        self.input = None;
        self.events.push(NarrationEvent::InputSubmitted(input.clone()));
        self.update(now);
        input
    }

    /// Marks that an answer is being worked out.
    pub fn show_thinking(&mut self) {
        if !self.thinking {
            self.thinking = true;
            self.events.push(NarrationEvent::ThinkingShown);
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    pub fn state(&self) -> ChannelState {
        match &self.current {
            Some(line) if line.presented_at.is_none() => ChannelState::Typing,
            Some(_) => ChannelState::AwaitingContinue,
            None if self.input_is_open() => ChannelState::AwaitingInput,
            None => ChannelState::Idle,
        }
    }

    /// Nothing presenting, nothing queued, no input wanted.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty() && self.input.is_none()
    }

    pub fn input_mode(&self) -> Option<&InputMode> {
        self.input
            .as_ref()
            .filter(|slot| slot.open)
            .map(|slot| &slot.mode)
    }

    fn input_is_open(&self) -> bool {
        self.input.as_ref().is_some_and(|slot| slot.open)
    }

    pub fn speaker(&self) -> Option<&Speaker> {
        self.speaker.as_ref()
    }

    pub fn current_token(&self) -> Option<LineToken> {
        self.current.as_ref().map(|line| line.token)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// What a reader sees right now.
    pub fn visible_text(&self) -> String {
        match &self.current {
            Some(line) => line.text.chars().take(line.revealed).collect(),
            None => self.shown.clone(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<NarrationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Scene teardown.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.interrupt();
        self.cancel_input();
        self.thinking = false;
    }
}

/// Text handed to speech: `*stage directions*` and a leading `Name:` are
/// dropped.
pub fn speakable_text(text: &str, speaker: &Speaker) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_direction = false;
    for c in text.chars() {
        if c == '*' {
            in_direction = !in_direction;
            continue;
        }
        if !in_direction {
            out.push(c);
        }
    }

    let mut spoken = out.trim();
    if let Some((prefix, rest)) = spoken.split_once(':') {
        if prefix.trim().eq_ignore_ascii_case(speaker.label()) {
            spoken = rest.trim();
        }
    }

    spoken.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingVoice {
        spoken: Arc<Mutex<Vec<String>>>,
        cancelled: Arc<Mutex<Vec<VoiceTicket>>>,
        next: u64,
    }

    impl Voice for RecordingVoice {
        fn speak(&mut self, text: &str, _profile: &str) -> Option<VoiceTicket> {
            self.next += 1;
            self.spoken.lock().unwrap().push(text.to_string());
            Some(VoiceTicket(self.next))
        }

        fn cancel(&mut self, ticket: VoiceTicket) {
            self.cancelled.lock().unwrap().push(ticket);
        }
    }

    fn narrator() -> Speaker {
        Speaker::Narrator
    }

    fn elric() -> Speaker {
        Speaker::PartyMember("Elric".into())
    }

    #[test]
    fn typewriter_reveals_one_char_per_interval() {
        let mut channel = NarrationChannel::silent(30);
        channel.say(0, "Hello", narrator(), SayOptions::default());

        assert_eq!(channel.state(), ChannelState::Typing);
        channel.update(60);
        assert_eq!(channel.visible_text(), "He");

        channel.update(150);
        assert_eq!(channel.visible_text(), "Hello");
        assert_eq!(channel.state(), ChannelState::AwaitingContinue);

        assert!(channel.proceed(151));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn line_waits_for_both_text_and_voice() {
        let voice = RecordingVoice::default();
        let mut channel = NarrationChannel::new(Box::new(voice.clone()), 10);
        channel.say(0, "Hi", narrator(), SayOptions::default());

        channel.update(1_000);
        assert_eq!(channel.state(), ChannelState::Typing, "voice still playing");

        channel.voice_finished(VoiceTicket(99), true);
        channel.update(1_001);
        assert_eq!(channel.state(), ChannelState::Typing, "unrelated ticket ignored");

        channel.voice_finished(VoiceTicket(1), true);
        channel.update(1_002);
        assert_eq!(channel.state(), ChannelState::AwaitingContinue);
    }

    #[test]
    fn skip_fast_forwards_then_continues() {
        let voice = RecordingVoice::default();
        let mut channel = NarrationChannel::new(Box::new(voice.clone()), 30);
        channel.say(0, "A long line of text", narrator(), SayOptions::default());

        assert!(channel.skip(10));
        assert_eq!(channel.visible_text(), "A long line of text");
        assert_eq!(channel.state(), ChannelState::AwaitingContinue);
        assert_eq!(voice.cancelled.lock().unwrap().as_slice(), &[VoiceTicket(1)]);

        assert!(channel.skip(20));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn queued_lines_run_in_order() {
        let mut channel = NarrationChannel::silent(0);
        let first = channel.say(0, "one", elric(), SayOptions::queued().hold_for(100));
        let second = channel.say(0, "two", elric(), SayOptions::queued().hold_for(100));
        assert_eq!(channel.queued(), 1);
        assert_eq!(channel.current_token(), Some(first));

        channel.update(99);
        assert_eq!(channel.current_token(), Some(first));
        channel.update(100);
        assert_eq!(channel.current_token(), Some(second));
        channel.update(200);
        assert!(channel.is_idle());

        let started: Vec<LineToken> = channel
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NarrationEvent::LineStarted { token, .. } => Some(token),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![first, second]);
    }

    #[test]
    fn narrator_preempts_and_keeps_partial_text() {
        let voice = RecordingVoice::default();
        let mut channel = NarrationChannel::new(Box::new(voice.clone()), 10);
        let reply = channel.say(0, "abcdefgh", elric(), SayOptions::queued());
        channel.update(30);

        channel.say(30, "Stop.", narrator(), SayOptions::default());

        let events = channel.drain_events();
        assert!(events.contains(&NarrationEvent::LineEnded {
            token: reply,
            interrupted: true
        }));
        assert!(events.contains(&NarrationEvent::SpeakerChanged(narrator())));
        assert_eq!(voice.cancelled.lock().unwrap().as_slice(), &[VoiceTicket(1)]);
        assert_eq!(channel.speaker(), Some(&narrator()));
    }

    #[test]
    fn input_opens_after_the_current_line() {
        let mut channel = NarrationChannel::silent(10);
        channel.say(0, "What do you say?", narrator(), SayOptions::default());
        channel.request_input(0, InputMode::Typed);

        assert_eq!(channel.input_mode(), None);
        assert_eq!(channel.submit_text(5, "hi"), Err(InputRejected::NotOpen));

        channel.update(1_000);
        assert_eq!(channel.input_mode(), Some(&InputMode::Typed));
        assert_eq!(channel.state(), ChannelState::AwaitingInput);

        let input = channel.submit_text(1_001, "  hello there ").unwrap();
        assert_eq!(input, PlayerInput::Text("hello there".into()));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn input_modes_are_exclusive() {
        let mut channel = NarrationChannel::silent(10);
        channel.request_input(0, InputMode::Typed);
        assert_eq!(channel.toggle_voice_capture(), Some(InputMode::Voice));

        assert_eq!(
            channel.submit_text(0, "typed"),
            Err(InputRejected::WrongMode {
                active: "voice",
                attempted: "typed"
            })
        );
        assert!(channel.submit_voice(0, "spoken").is_ok());

        channel.request_input(0, InputMode::Choice(vec!["fight".into(), "flee".into()]));
        assert_eq!(channel.select_option(0, 5), Err(InputRejected::NoSuchOption(5)));
        assert_eq!(
            channel.select_option(0, 1).map(|i| i.text().to_string()),
            Ok("flee".to_string())
        );
    }

    #[test]
    fn queued_lines_wait_behind_open_input() {
        let mut channel = NarrationChannel::silent(0);
        channel.request_input(0, InputMode::Typed);
        channel.say(0, "later", elric(), SayOptions::queued());
        assert_eq!(channel.state(), ChannelState::AwaitingInput);

        channel.submit_text(10, "now").unwrap();
        assert_eq!(channel.state(), ChannelState::AwaitingContinue);
        assert_eq!(channel.visible_text(), "later");
    }

    #[test]
    fn empty_and_unvoiced_lines_complete_text_only() {
        let voice = RecordingVoice::default();
        let mut channel = NarrationChannel::new(Box::new(voice.clone()), 30);

        channel.say(0, "", narrator(), SayOptions::default());
        assert_eq!(channel.state(), ChannelState::AwaitingContinue);

        channel.say(0, "*nods*", elric(), SayOptions::default());
        channel.update(6 * 30);
        assert_eq!(channel.state(), ChannelState::AwaitingContinue);
        assert!(voice.spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn speech_drops_directions_and_name_prefix() {
        assert_eq!(
            speakable_text("Elric: *draws his bow* We go   left.", &elric()),
            "We go left."
        );
        assert_eq!(speakable_text("Note: hold fast", &elric()), "Note: hold fast");
    }
}
