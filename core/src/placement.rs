use std::collections::BTreeSet;

use ndarray::Array2;
use rand::prelude::*;

use crate::cell::Cell;
use crate::types::*;

/// Fills the grid with `mines` mines, keeping `safe` clear along with its
/// whole neighborhood when the board has room for that, then recomputes the
/// adjacency counts. Called exactly once per session, on the first open.
pub(crate) fn place_mines(grid: &mut Array2<Cell>, mines: Ax, safe: Ix2, rng: &mut SmallRng) {
    let mut candidates = candidate_coords(grid, safe, true);
    if (candidates.len() as Ax) < mines {
        log::warn!(
            "not enough room to spare the starting neighborhood, only {:?} stays safe",
            safe
        );
        candidates = candidate_coords(grid, safe, false);
    }

    candidates.shuffle(rng);
    for &pos in candidates.iter().take(usize::from(mines)) {
        grid[pos.convert()].mine = true;
    }
    log::debug!("placed {} mines around safe start {:?}", mines, safe);

    recount_adjacent(grid);
}

/// Every position outside the forbidden zone, in row-major order. The
/// forbidden zone is the safe cell plus, optionally, its neighbors.
fn candidate_coords(grid: &Array2<Cell>, safe: Ix2, spare_neighbors: bool) -> Vec<Ix2> {
    let mut forbidden = BTreeSet::from([safe]);
    if spare_neighbors {
        forbidden.extend(grid.iter_adjacent(safe));
    }

    let (w, h) = grid.dim2();
    let mut candidates = Vec::with_capacity(grid.len() - forbidden.len());
    for y in 0..h {
        for x in 0..w {
            if !forbidden.contains(&(x, y)) {
                candidates.push((x, y));
            }
        }
    }
    candidates
}

pub(crate) fn recount_adjacent(grid: &mut Array2<Cell>) {
    let (w, h) = grid.dim2();
    for y in 0..h {
        for x in 0..w {
            let count = if grid[(x, y).convert()].mine {
                0
            } else {
                grid.iter_adjacent((x, y))
                    .filter(|&pos| grid[pos.convert()].mine)
                    .count()
                    .try_into()
                    .unwrap()
            };
            grid[(x, y).convert()].adjacent = count;
        }
    }
}
