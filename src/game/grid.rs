//! Hex map generation: category layout, loot, spawn points

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::hex::Hex;
use super::player::Item;

/// Default quiz categories painted onto the map
pub const DEFAULT_CATEGORIES: [&str; 10] = [
    "science",
    "history",
    "geography",
    "entertainment",
    "sports",
    "music",
    "food",
    "space",
    "technology",
    "animals",
];

/// A single map cell as sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexCell {
    pub q: i32,
    pub r: i32,
    /// `None` only for the center hex
    pub category: Option<String>,
}

impl HexCell {
    pub fn hex(&self) -> Hex {
        Hex::new(self.q, self.r)
    }
}

/// Static hex map for one game
#[derive(Debug, Clone)]
pub struct Grid {
    radius: u32,
    cells: Vec<HexCell>,
    index: HashMap<Hex, usize>,
}

impl Grid {
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Cells in enumeration order (q ascending, then r ascending)
    pub fn cells(&self) -> &[HexCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, hex: Hex) -> bool {
        self.index.contains_key(&hex)
    }

    pub fn category(&self, hex: Hex) -> Option<&str> {
        self.index
            .get(&hex)
            .and_then(|&i| self.cells[i].category.as_deref())
    }

    pub fn hexes(&self) -> impl Iterator<Item = Hex> + '_ {
        self.cells.iter().map(HexCell::hex)
    }

    pub fn is_edge(&self, hex: Hex) -> bool {
        self.contains(hex) && hex.dist() == self.radius
    }

    /// Outer ring, ordered by angle
    pub fn edge_hexes(&self) -> Vec<Hex> {
        let mut edges: Vec<Hex> = self.hexes().filter(|h| h.dist() == self.radius).collect();
        edges.sort_by(|a, b| a.angle().total_cmp(&b.angle()));
        edges
    }
}

/// Builds a [`Grid`] and its loot layout
pub struct GridGenerator<'a> {
    radius: u32,
    categories: &'a [String],
    loot_density: f64,
}

impl<'a> GridGenerator<'a> {
    pub fn new(radius: u32, categories: &'a [String]) -> Self {
        Self {
            radius,
            categories,
            loot_density: 0.0,
        }
    }

    pub fn with_loot_density(mut self, density: f64) -> Self {
        self.loot_density = density.clamp(0.0, 1.0);
        self
    }

    /// Enumerate every hex within the radius and paint categories ring by ring.
    ///
    /// Each hex avoids the categories of already-painted neighbors when it can,
    /// and among the allowed ones takes the least used so far, ties broken at
    /// random.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Grid {
        let r = self.radius as i32;
        let mut hexes = Vec::new();
        let mut index = HashMap::new();
        for q in -r..=r {
            for s in (-r).max(-q - r)..=r.min(-q + r) {
                let hex = Hex::new(q, s);
                index.insert(hex, hexes.len());
                hexes.push(hex);
            }
        }

        let mut order: Vec<Hex> = hexes.iter().copied().filter(|h| !h.is_center()).collect();
        order.sort_by(|a, b| {
            a.dist()
                .cmp(&b.dist())
                .then_with(|| a.angle().total_cmp(&b.angle()))
        });

        let n = self.categories.len();
        let mut assigned: Vec<Option<usize>> = vec![None; hexes.len()];
        let mut usage = vec![0usize; n];

        for hex in order {
            let used: HashSet<usize> = hex
                .neighbors()
                .iter()
                .filter_map(|nb| index.get(nb))
                .filter_map(|&i| assigned[i])
                .collect();

            let mut candidates: Vec<usize> = (0..n).filter(|c| !used.contains(c)).collect();
            if candidates.is_empty() {
                candidates = (0..n).collect();
            }

            let Some(least) = candidates.iter().map(|&c| usage[c]).min() else {
                continue;
            };
            let best: Vec<usize> = candidates
                .into_iter()
                .filter(|&c| usage[c] == least)
                .collect();

            if let Some(&pick) = best.choose(rng) {
                assigned[index[&hex]] = Some(pick);
                usage[pick] += 1;
            }
        }

        let cells = hexes
            .iter()
            .zip(assigned)
            .map(|(hex, cat)| HexCell {
                q: hex.q,
                r: hex.r,
                category: cat.map(|c| self.categories[c].clone()),
            })
            .collect();

        Grid {
            radius: self.radius,
            cells,
            index,
        }
    }

    /// Flag a random share of non-center hexes as carrying an item
    pub fn place_loot<R: Rng + ?Sized>(&self, grid: &Grid, rng: &mut R) -> BTreeMap<Hex, Item> {
        grid.hexes()
            .filter(|h| !h.is_center())
            .filter(|_| rng.gen_bool(self.loot_density))
            .map(|h| (h, Item::Missile))
            .collect()
    }
}

/// Evenly spaced edge hexes for `count` players, rotated by a random offset
pub fn spread_spawns<R: Rng + ?Sized>(edges: &[Hex], count: usize, rng: &mut R) -> Vec<Hex> {
    if edges.is_empty() || count == 0 {
        return Vec::new();
    }
    let step = edges.len() as f64 / count as f64;
    let offset = rng.gen_range(0.0..step);
    (0..count)
        .map(|i| edges[(offset + i as f64 * step).floor() as usize % edges.len()])
        .collect()
}

/// Resolve final spawn positions.
///
/// Explicit claims win. Everyone else takes their evenly spread slot when it is
/// free, otherwise a random unclaimed edge hex, and only when the edge is
/// exhausted a random (possibly shared) edge hex.
pub fn assign_spawns<R: Rng + ?Sized>(
    grid: &Grid,
    players: &[usize],
    claims: &BTreeMap<usize, Hex>,
    rng: &mut R,
) -> BTreeMap<usize, Hex> {
    let edges = grid.edge_hexes();
    let spread = spread_spawns(&edges, players.len(), rng);
    let mut taken: HashSet<Hex> = claims
        .iter()
        .filter(|(idx, _)| players.contains(idx))
        .map(|(_, hex)| *hex)
        .collect();

    let mut result = BTreeMap::new();
    for (slot, &idx) in players.iter().enumerate() {
        if let Some(&hex) = claims.get(&idx) {
            result.insert(idx, hex);
            continue;
        }

        let pick = match spread.get(slot).copied().filter(|h| !taken.contains(h)) {
            Some(hex) => hex,
            None => {
                let available: Vec<Hex> = edges
                    .iter()
                    .copied()
                    .filter(|h| !taken.contains(h))
                    .collect();
                match available.choose(rng) {
                    Some(&hex) => hex,
                    None => edges.choose(rng).copied().unwrap_or(Hex::CENTER),
                }
            }
        };

        taken.insert(pick);
        result.insert(idx, pick);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn categories() -> Vec<String> {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn grid_shape_matches_radius() {
        let cats = categories();
        for radius in 1..=8u32 {
            let mut rng = ChaCha8Rng::seed_from_u64(radius as u64);
            let grid = GridGenerator::new(radius, &cats).generate(&mut rng);
            let r = radius as usize;

            assert_eq!(grid.len(), 3 * r * r + 3 * r + 1);
            assert!(grid.hexes().all(|h| h.dist() <= radius));
            assert_eq!(grid.edge_hexes().len(), 6 * r);
            for cell in grid.cells() {
                if cell.hex().is_center() {
                    assert!(cell.category.is_none());
                } else {
                    assert!(cell.category.is_some(), "{} has no category", cell.hex());
                }
            }
        }
    }

    #[test]
    fn categories_stay_balanced() {
        let cats = categories();
        for seed in 0..20u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let grid = GridGenerator::new(8, &cats).generate(&mut rng);

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for cell in grid.cells() {
                if let Some(c) = cell.category.as_deref() {
                    *counts.entry(c).or_default() += 1;
                }
            }
            assert_eq!(counts.len(), cats.len());
            let max = counts.values().max().copied().unwrap_or(0);
            let min = counts.values().min().copied().unwrap_or(0);
            assert!(max - min <= 4, "seed {seed}: spread {min}..{max}");
        }
    }

    #[test]
    fn neighbors_rarely_share_a_category() {
        let cats = categories();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let grid = GridGenerator::new(6, &cats).generate(&mut rng);

        let clashes = grid
            .hexes()
            .filter(|h| !h.is_center())
            .flat_map(|h| h.neighbors().into_iter().map(move |n| (h, n)))
            .filter(|(h, n)| {
                !n.is_center() && grid.contains(*n) && grid.category(*h) == grid.category(*n)
            })
            .count();
        assert_eq!(clashes, 0);
    }

    #[test]
    fn loot_never_lands_on_center() {
        let cats = categories();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let generator = GridGenerator::new(4, &cats).with_loot_density(1.0);
        let grid = generator.generate(&mut rng);
        let loot = generator.place_loot(&grid, &mut rng);

        assert_eq!(loot.len(), grid.len() - 1);
        assert!(!loot.contains_key(&Hex::CENTER));
    }

    #[test]
    fn spread_spawns_are_distinct() {
        let cats = categories();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let grid = GridGenerator::new(3, &cats).generate(&mut rng);
        let edges = grid.edge_hexes();

        let spawns = spread_spawns(&edges, 6, &mut rng);
        let unique: HashSet<Hex> = spawns.iter().copied().collect();
        assert_eq!(unique.len(), 6);
        assert!(spawns.iter().all(|h| grid.is_edge(*h)));
    }

    #[test]
    fn assignment_keeps_claims_and_avoids_collisions() {
        let cats = categories();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let grid = GridGenerator::new(2, &cats).generate(&mut rng);
        let edges = grid.edge_hexes();

        let mut claims = BTreeMap::new();
        claims.insert(0, edges[0]);
        claims.insert(2, edges[1]);

        let players: Vec<usize> = (0..12).collect();
        let spawns = assign_spawns(&grid, &players, &claims, &mut rng);

        assert_eq!(spawns[&0], edges[0]);
        assert_eq!(spawns[&2], edges[1]);
        let unique: HashSet<Hex> = spawns.values().copied().collect();
        assert_eq!(unique.len(), 12, "12 edge hexes fit 12 players");
    }

    #[test]
    fn exhausted_edge_allows_duplicates() {
        let cats = categories();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let grid = GridGenerator::new(1, &cats).generate(&mut rng);

        let players: Vec<usize> = (0..8).collect();
        let spawns = assign_spawns(&grid, &players, &BTreeMap::new(), &mut rng);
        assert_eq!(spawns.len(), 8);
        assert!(spawns.values().all(|h| grid.is_edge(*h)));
    }
}
