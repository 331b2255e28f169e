use super::*;

const HAPPY_PATH: [QueryState; 7] = [
    QueryState::Idle,
    QueryState::Embedding,
    QueryState::Retrieving,
    QueryState::PromptAssembled,
    QueryState::Generating,
    QueryState::Streaming,
    QueryState::Done,
];

#[test]
fn happy_path_is_linear() {
    let mut state = QueryState::Idle;
    for next in HAPPY_PATH.iter().skip(1) {
        state.advance(*next).expect("step should be legal");
    }
    assert_eq!(state, QueryState::Done);
    assert!(state.is_terminal());
}

#[test]
fn skipping_a_step_is_rejected() {
    let mut state = QueryState::Idle;
    let err = state
        .advance(QueryState::Retrieving)
        .expect_err("cannot skip embedding");

    assert!(matches!(
        err,
        RagError::InvalidTransition {
            from: QueryState::Idle,
            to: QueryState::Retrieving
        }
    ));
    assert_eq!(state, QueryState::Idle);
    assert_eq!(
        err.to_string(),
        "Query pipeline cannot move from idle to retrieving"
    );
}

#[test]
fn any_live_state_can_fail() {
    for state in HAPPY_PATH.iter().take(6) {
        assert!(state.can_transition_to(QueryState::Failed), "{state} should fail");
    }
}

#[test]
fn terminal_states_are_final() {
    for terminal in [QueryState::Done, QueryState::Failed] {
        for next in HAPPY_PATH.iter().chain(&[QueryState::Failed]) {
            assert!(!terminal.can_transition_to(*next));
        }
    }

    let mut state = QueryState::Done;
    state.fail();
    assert_eq!(state, QueryState::Done);
}
