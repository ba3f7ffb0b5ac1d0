use dungeon_rs::{solve, Action, Grid, ItemSet, Movement, SolverConfig, State};

fn solved(map: &str, cfg: &SolverConfig) -> (Grid, dungeon_rs::Solution) {
    let grid = Grid::parse(map).unwrap();
    let sol = solve(&grid, cfg);
    (grid, sol)
}

#[test]
fn single_cell_room_exits() {
    let (grid, sol) = solved("S", &SolverConfig::default());
    assert_eq!(sol.action_for(State::new(grid.start(), ItemSet::EMPTY)), Some(Action::Exit));
    assert!(sol.stats().stable);
}

#[test]
fn corridor_collects_gold_then_returns_and_exits() {
    let (_, sol) = solved("S.G", &SolverConfig::default());
    let got = ItemSet::EMPTY.with(0);
    assert_eq!(sol.action_for(State::new((0, 0), ItemSet::EMPTY)), Some(Action::East));
    assert_eq!(sol.action_for(State::new((1, 0), ItemSet::EMPTY)), Some(Action::East));
    assert_eq!(sol.action_for(State::new((2, 0), got)), Some(Action::West));
    assert_eq!(sol.action_for(State::new((1, 0), got)), Some(Action::West));
    assert_eq!(sol.action_for(State::new((0, 0), got)), Some(Action::Exit));
}

#[test]
fn pit_next_to_start_is_never_chosen() {
    for movement in [Movement::Deterministic, Movement::Drift] {
        for avoid_pits in [true, false] {
            let cfg = SolverConfig { movement, avoid_pits, ..SolverConfig::default() };
            let (grid, sol) = solved("XXXXX\nXPS.X\nX.G.X\nXXXXX", &cfg);
            for mask in 0..2 {
                let a = sol.action_for(State::new(grid.start(), ItemSet::from_bits(mask))).unwrap();
                assert_ne!(a, Action::West, "{movement:?} avoid_pits {avoid_pits} mask {mask}");
            }
        }
    }
}

#[test]
fn every_state_gets_a_valid_action() {
    let map = "XXXXXXX\nXS..G.X\nX.XPX.X\nXGB...X\nXXXXXXX";
    for movement in [Movement::Deterministic, Movement::Drift] {
        let cfg = SolverConfig { movement, seed: 5, ..SolverConfig::default() };
        let (grid, sol) = solved(map, &cfg);
        assert_eq!(sol.policy().len(), sol.space().len());
        for (state, action) in sol.iter() {
            assert!(action != Action::Exit || state.pos == grid.start(), "{state:?}");
        }
        assert_eq!(sol.improve_once(), sol.policy());
    }
}

#[test]
fn solving_terminates_under_tight_caps() {
    let cfg = SolverConfig { max_evaluation_sweeps: 2, max_policy_iterations: 3, ..SolverConfig::default() };
    let (_, sol) = solved("S..G\n.P..\nG..G", &cfg);
    assert!(sol.stats().policy_iterations <= 3);
    assert!(sol.stats().evaluation_sweeps <= 6);
}

#[test]
fn gold_raises_the_value_of_the_start() {
    let (grid, sol) = solved("S.G", &SolverConfig::default());
    let empty = sol.value_of(State::new(grid.start(), ItemSet::EMPTY)).unwrap();
    let carrying = sol.value_of(State::new(grid.start(), ItemSet::EMPTY.with(0))).unwrap();
    assert!(carrying > empty);
}
