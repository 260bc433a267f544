//! The state machine a template compiles into.
//!
//! States carry no payload. Each transition holds the segment matcher of one
//! template element and consumes exactly one path segment. A recursive
//! wildcard does not create a state: it adds a self-loop to the current
//! state, so the machine is nondeterministic there and matching becomes a
//! depth-first search over `(state, position)` pairs that remembers the
//! pairs known to fail.

use std::collections::HashSet;

use crate::element::ElementSpec;

/// Index of a state.
pub type StateId = usize;

/// An edge consuming one segment.
#[derive(Debug, Clone)]
pub struct Transition {
    matcher: ElementSpec,
    target: StateId,
}

impl Transition {
    /// The element this transition tests segments against.
    pub fn matcher(&self) -> &ElementSpec {
        &self.matcher
    }

    /// The state reached after consuming the segment.
    pub fn target(&self) -> StateId {
        self.target
    }
}

/// A compiled template automaton with a single final state.
#[derive(Debug, Clone)]
pub struct Automaton {
    /// Outgoing transitions per state, tried in insertion order.
    states: Vec<Vec<Transition>>,
    final_state: StateId,
}

impl Automaton {
    pub const START: StateId = 0;

    /// Builds the automaton for a sequence of elements.
    pub fn compile(elements: &[ElementSpec]) -> Self {
        let mut states: Vec<Vec<Transition>> = vec![Vec::new()];
        let mut current = Self::START;

        for element in elements {
            if matches!(element, ElementSpec::RecursiveWildcard) {
                states[current].push(Transition {
                    matcher: element.clone(),
                    target: current,
                });
                continue;
            }
            states.push(Vec::new());
            let next = states.len() - 1;
            states[current].push(Transition {
                matcher: element.clone(),
                target: next,
            });
            current = next;
        }

        Self {
            states,
            final_state: current,
        }
    }

    /// Number of states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// The accepting state.
    pub fn final_state(&self) -> StateId {
        self.final_state
    }

    /// Outgoing transitions of `state`.
    pub fn transitions(&self, state: StateId) -> &[Transition] {
        self.states.get(state).map(Vec::as_slice).unwrap_or_default()
    }

    /// Runs the automaton over `segments`.
    ///
    /// Returns the captures collected along the first accepting path found,
    /// in path order, or `None` if no path consumes all input and ends in
    /// the final state.
    ///
    /// The search keeps its own stack of frames, so the depth of the path
    /// is bounded by memory rather than by the thread's stack.
    pub fn run(&self, segments: &[&str]) -> Option<Vec<(String, String)>> {
        let mut failed: HashSet<(StateId, usize)> = HashSet::new();
        let mut captures = Vec::new();
        let mut stack = vec![Frame::enter(Self::START, 0, 0)];

        while let Some(frame) = stack.last_mut() {
            let Some(segment) = segments.get(frame.position).copied() else {
                if frame.state == self.final_state {
                    return Some(captures);
                }
                stack.pop();
                continue;
            };

            let Some(transition) = self.transitions(frame.state).get(frame.next) else {
                failed.insert((frame.state, frame.position));
                stack.pop();
                continue;
            };
            frame.next += 1;
            captures.truncate(frame.mark);

            let next = (transition.target, frame.position + 1);
            if failed.contains(&next) {
                continue;
            }
            if transition.matcher.capture(segment, &mut captures) {
                stack.push(Frame::enter(next.0, next.1, captures.len()));
            }
        }

        None
    }
}

/// One `(state, position)` pair on the search stack.
struct Frame {
    state: StateId,
    position: usize,
    /// Index of the next transition to try.
    next: usize,
    /// Capture count when the frame was entered.
    mark: usize,
}

impl Frame {
    fn enter(state: StateId, position: usize, mark: usize) -> Self {
        Self {
            state,
            position,
            next: 0,
            mark,
        }
    }
}
