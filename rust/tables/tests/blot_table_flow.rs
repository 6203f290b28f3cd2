use std::sync::Arc;

use cardroom_engine::blot::{BlotPhase, HandResult, TrumpDecision, FULL_HAND_SIZE};
use cardroom_engine::errors::BlotError;
use cardroom_engine::history::GameKind;
use cardroom_engine::rules::PokerAction;
use cardroom_tables::{
    CardRoom, EventBus, GameStateStore, InMemoryParticipants, LedgerGateway, ManualScheduler,
    RoomStatus, ScheduledJob, SeededShuffler, SettingsStore, TableError, TableEvent,
    TableSettings,
};

const ROOM: u64 = 7;

fn blot_room(target: u32) -> (CardRoom, Arc<ManualScheduler>, EventBus) {
    let settings = TableSettings {
        blot_target_score: target,
        blot_next_hand_delay_ms: 0,
        ..Default::default()
    };
    let scheduler = Arc::new(ManualScheduler::new());
    let events = EventBus::new();
    let room = CardRoom::with_dependencies(
        Arc::new(SettingsStore::with_settings(settings.clone()).unwrap()),
        Arc::new(GameStateStore::in_memory(settings.state_ttl())),
        Arc::new(LedgerGateway::in_memory()),
        Arc::new(InMemoryParticipants::new()),
        Arc::new(events.clone()),
        scheduler.clone(),
        Arc::new(SeededShuffler::new(2024)),
    );
    room.create_room(ROOM, GameKind::Blot).unwrap();
    room.take_seat(ROOM, 10, 0, 0, 0).unwrap();
    room.take_seat(ROOM, 20, 0, 1, 0).unwrap();
    (room, scheduler, events)
}

fn run_jobs(room: &CardRoom, scheduler: &ManualScheduler) {
    for job in scheduler.take_jobs() {
        room.run_job(&job).unwrap();
    }
}

/// Plays the stored hand to the end, probing the follow rules along the
/// way. Returns the result and how many illegal plays were refused.
fn play_out_hand(room: &CardRoom) -> (HandResult, usize) {
    let state = room.blot_state(ROOM).unwrap().expect("hand dealt");
    assert_eq!(state.phase, BlotPhase::AwaitingTrumpDecision);
    room.blot_decide_trump(ROOM, state.dealer_id, TrumpDecision::Accept)
        .unwrap();

    let mut refused = 0;
    loop {
        let state = room.blot_state(ROOM).unwrap().expect("hand in progress");
        let player = state.current_player.expect("someone to play");
        let legal = cardroom_engine::blot::legal_cards(&state, player);
        let hand = state.hand_of(player).unwrap().to_vec();
        assert!(!legal.is_empty());

        if let Some(&illegal) = hand.iter().find(|c| !legal.contains(c)) {
            let err = room.blot_play_card(ROOM, player, illegal).unwrap_err();
            assert!(
                matches!(
                    err,
                    TableError::Blot(BlotError::MustFollowSuit(_))
                        | TableError::Blot(BlotError::MustPlayTrumpWhenLed(_))
                ),
                "unexpected {err:?}"
            );
            assert_eq!(room.blot_state(ROOM).unwrap().unwrap(), state);
            refused += 1;
        }

        if let Some(result) = room.blot_play_card(ROOM, player, legal[0]).unwrap() {
            return (result, refused);
        }
    }
}

#[test]
fn match_runs_to_target_and_resets() {
    let (room, scheduler, events) = blot_room(3);
    let mut sub = events.subscribe(ROOM);

    let mut hands: u32 = 0;
    let mut last = None;
    for _ in 0..30 {
        run_jobs(&room, &scheduler);
        let (result, _) = play_out_hand(&room);
        hands += 1;
        assert!(room.blot_state(ROOM).unwrap().is_none());
        let finished = result.match_winner.is_some();
        last = Some(result);
        if finished {
            break;
        }
        let meta = room.blot_meta(ROOM).unwrap().expect("match continues");
        assert_eq!(meta.round, hands);
        assert_eq!(scheduler.pending(), 1);
    }

    let result = last.unwrap();
    let winner = result.match_winner.expect("match decided");
    assert!(result.match_scores[&winner] >= 3);
    assert_eq!(
        room.participants().room(ROOM).unwrap().status,
        RoomStatus::Waiting
    );
    assert!(room.blot_meta(ROOM).unwrap().is_none());
    assert_eq!(scheduler.pending(), 0);

    let history = room.hand_history();
    assert_eq!(history.len(), hands as usize);
    assert!(history.iter().all(|r| r.game == GameKind::Blot));
    assert!(history.iter().all(|r| r.board.len() == 2 * FULL_HAND_SIZE));

    let finished: Vec<_> = sub
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            TableEvent::BlotMatchFinished { winner, .. } => Some(winner),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![winner]);

    // a rematch starts from zero
    assert_eq!(room.reconcile_room_status(ROOM).unwrap(), RoomStatus::Playing);
    assert_eq!(
        scheduler.take_jobs(),
        vec![ScheduledJob::StartBlotHand { room_id: ROOM }]
    );
    room.start_blot_hand(ROOM).unwrap();
    let state = room.blot_state(ROOM).unwrap().unwrap();
    assert_eq!(state.round, 1);
    assert!(state.match_scores.values().all(|&s| s == 0));
}

#[test]
fn dealer_alternates_between_hands() {
    let (room, scheduler, _) = blot_room(50);
    run_jobs(&room, &scheduler);
    let first = room.blot_state(ROOM).unwrap().unwrap().dealer_id;
    play_out_hand(&room);
    run_jobs(&room, &scheduler);
    let second = room.blot_state(ROOM).unwrap().unwrap();
    assert_ne!(second.dealer_id, first);
    assert_eq!(second.round, 2);
}

#[test]
fn rejecting_trump_names_a_new_suit() {
    let (room, scheduler, _) = blot_room(11);
    run_jobs(&room, &scheduler);
    let state = room.blot_state(ROOM).unwrap().unwrap();
    let other = cardroom_engine::cards::ALL_SUITS
        .into_iter()
        .find(|&s| s != state.proposed_trump.suit)
        .unwrap();

    let opponent = state.opponent_of(state.dealer_id).unwrap();
    let err = room
        .blot_decide_trump(ROOM, opponent, TrumpDecision::Accept)
        .unwrap_err();
    assert!(matches!(err, TableError::Blot(BlotError::NotYourTurn { .. })));

    room.blot_decide_trump(ROOM, state.dealer_id, TrumpDecision::Reject(Some(other)))
        .unwrap();
    let state = room.blot_state(ROOM).unwrap().unwrap();
    assert_eq!(state.trump_suit, Some(other));
    assert_eq!(state.current_player, Some(state.dealer_id));
}

#[test]
fn seats_are_locked_during_a_hand() {
    let (room, scheduler, _) = blot_room(11);
    run_jobs(&room, &scheduler);

    let err = room.vacate_seat(ROOM, 10).unwrap_err();
    assert!(matches!(err, TableError::HandInProgress(ROOM)));
    let err = room.take_seat(ROOM, 30, 0, 0, 0).unwrap_err();
    assert!(matches!(err, TableError::Participants(_)));
}

#[test]
fn start_job_without_two_players_leaves_room_waiting() {
    let (room, scheduler, events) = blot_room(11);
    let jobs = scheduler.take_jobs();
    assert_eq!(jobs, vec![ScheduledJob::StartBlotHand { room_id: ROOM }]);

    room.vacate_seat(ROOM, 20).unwrap();
    room.run_job(&jobs[0]).unwrap();
    assert!(room.blot_state(ROOM).unwrap().is_none());
    assert_eq!(
        room.participants().room(ROOM).unwrap().status,
        RoomStatus::Waiting
    );

    // a seat dropped outside the lobby is caught when the job runs
    room.take_seat(ROOM, 20, 0, 1, 0).unwrap();
    let jobs = scheduler.take_jobs();
    assert_eq!(jobs, vec![ScheduledJob::StartBlotHand { room_id: ROOM }]);
    room.participants().remove_player(ROOM, 10).unwrap();
    assert_eq!(
        room.participants().room(ROOM).unwrap().status,
        RoomStatus::Playing
    );

    let mut sub = events.subscribe(ROOM);
    room.run_job(&jobs[0]).unwrap();
    assert!(room.blot_state(ROOM).unwrap().is_none());
    assert_eq!(
        room.participants().room(ROOM).unwrap().status,
        RoomStatus::Waiting
    );
    assert!(sub.drain().contains(&TableEvent::RoomStatusChanged {
        status: RoomStatus::Waiting
    }));
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn blot_rooms_refuse_poker_and_chips() {
    let (room, _, _) = blot_room(11);
    let err = room.poker_action(ROOM, 10, PokerAction::Fold).unwrap_err();
    assert!(matches!(
        err,
        TableError::WrongGame {
            room_id: ROOM,
            expected: GameKind::Poker
        }
    ));

    room.create_room(8, GameKind::Blot).unwrap();
    let err = room.take_seat(8, 10, 0, 0, 100).unwrap_err();
    assert!(matches!(
        err,
        TableError::BuyInOutOfRange {
            amount: 100,
            min: 0,
            max: 0
        }
    ));
}
