use dungeon_rs::{
    replay, Action, Controller, ControllerConfig, Grid, HistoryEvent, ItemSet, Movement, Outcome, TransitionModel,
    TurnRequest, TurnResponse,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

/// Drive the controller against a minimal server loop until it exits or runs out of turns.
fn play(map: &str, movement: Movement, max_turns: usize) -> (Vec<HistoryEvent>, Option<Action>) {
    let grid = Grid::parse(map).unwrap();
    let model = TransitionModel::new(&grid, movement);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut cfg = ControllerConfig::default();
    cfg.solver.movement = movement;
    let mut controller = Controller::new(cfg);
    let mut req = TurnRequest { map: map.to_string(), free_skill_points: 4, ..Default::default() };
    let mut pos = grid.start();
    let mut carried = ItemSet::EMPTY;

    for _ in 0..max_turns {
        match controller.act(&req).unwrap() {
            TurnResponse::Allocate(points) => {
                req.free_skill_points = 0;
                req.skill_points = points.clone();
                req.history.push(HistoryEvent { action: Some(json!(points)), outcome: Outcome::default() });
            }
            TurnResponse::Act(Action::Exit) => return (req.history, Some(Action::Exit)),
            TurnResponse::Act(action) => {
                pos = model.sample(pos, action, &mut rng).unwrap();
                let mut outcome = Outcome { position: Some(pos), collected_gold_at: None };
                if let Some(ord) = grid.item_ordinal(pos) {
                    if !carried.contains(ord) {
                        carried = carried.with(ord);
                        outcome.collected_gold_at = Some(pos);
                    }
                }
                req.history.push(HistoryEvent { action: Some(json!(action)), outcome });
            }
        }
    }
    (req.history, None)
}

#[test]
fn corridor_episode_collects_and_exits() {
    let (history, last) = play("S.G", Movement::Deterministic, 20);
    assert_eq!(last, Some(Action::Exit));
    let moves: Vec<Action> = history
        .iter()
        .filter_map(|e| e.action.as_ref()?.as_str()?.parse().ok())
        .collect();
    assert_eq!(moves, vec![Action::East, Action::East, Action::West, Action::West]);
}

#[test]
fn replayed_item_set_only_grows() {
    let map = "XXXXXX\nXS.G.X\nX.X..X\nX.G..X\nXXXXXX";
    let grid = Grid::parse(map).unwrap();
    let (history, last) = play(map, Movement::Drift, 200);
    assert_eq!(last, Some(Action::Exit));
    let mut prev = ItemSet::EMPTY;
    for n in 0..=history.len() {
        let items = replay(&grid, &history[..n]).items;
        assert!(prev.is_subset_of(items));
        prev = items;
    }
    assert!(!prev.is_empty());
    assert!(prev.is_subset_of(ItemSet::full(2)));
}
