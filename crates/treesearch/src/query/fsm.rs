//! Character-level tokenizer state machine.
//!
//! The transition table is total over the live states; reaching a terminal
//! state and feeding it another trigger is an internal error.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    PlainWord,
    WordBoundary,
    Quoted,
    QuoteBoundary,
    End,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    End,
    Space,
    DoubleQuote,
    Other,
}

impl Trigger {
    pub fn of(ch: Option<char>) -> Self {
        match ch {
            None => Trigger::End,
            Some('"') => Trigger::DoubleQuote,
            Some(c) if c.is_whitespace() => Trigger::Space,
            Some(_) => Trigger::Other,
        }
    }
}

/// Side effect attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Push,
    EmitWord,
    EmitPhrase,
}

pub fn transition(state: State, trigger: Trigger) -> (State, Action) {
    use Action as A;
    use State as S;
    use Trigger as T;
    match (state, trigger) {
        (S::WordBoundary | S::QuoteBoundary, T::Space) => (S::WordBoundary, A::None),
        (S::WordBoundary | S::QuoteBoundary, T::Other) => (S::PlainWord, A::Push),
        (S::WordBoundary | S::QuoteBoundary, T::DoubleQuote) => (S::Quoted, A::None),
        (S::WordBoundary | S::QuoteBoundary, T::End) => (S::End, A::None),

        (S::PlainWord, T::Other) => (S::PlainWord, A::Push),
        (S::PlainWord, T::Space) => (S::WordBoundary, A::EmitWord),
        (S::PlainWord, T::DoubleQuote) => (S::Quoted, A::EmitWord),
        (S::PlainWord, T::End) => (S::End, A::EmitWord),

        (S::Quoted, T::Other | T::Space) => (S::Quoted, A::Push),
        (S::Quoted, T::DoubleQuote) => (S::QuoteBoundary, A::EmitPhrase),
        // An unterminated phrase runs to the end of input.
        (S::Quoted, T::End) => (S::End, A::EmitPhrase),

        (S::End | S::Error, trigger) => {
            panic!("query tokenizer has no transition from {state:?} on {trigger:?}")
        }
    }
}

/// A raw token produced by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Phrase(String),
}

/// Drives the table over `input`, calling `emit` for each token.
///
/// If `emit` fails the machine moves to `Error` and the error is returned.
pub fn run<E>(input: &str, mut emit: impl FnMut(Token) -> Result<(), E>) -> Result<(), E> {
    let mut state = State::WordBoundary;
    let mut buffer = String::new();
    let mut chars = input.chars();
    loop {
        let ch = chars.next();
        let (next, action) = transition(state, Trigger::of(ch));
        let emitted = match action {
            Action::None => Ok(()),
            Action::Push => {
                if let Some(ch) = ch {
                    buffer.push(ch);
                }
                Ok(())
            }
            Action::EmitWord => emit(Token::Word(std::mem::take(&mut buffer))),
            Action::EmitPhrase => emit(Token::Phrase(std::mem::take(&mut buffer))),
        };
        if let Err(error) = emitted {
            state = State::Error;
            log::debug!("query tokenizer stopped state={:?}", state);
            return Err(error);
        }
        state = next;
        if state == State::End {
            return Ok(());
        }
    }
}
