use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::graph::{SkillCatalog, SkillGraph};
use crate::selection::{NodeStatus, Session};
use crate::tree::{PositionTag, SkillNode, SkillType};

/// Canvas geometry and spacing constants. All values are in canvas pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Distance of the baseline row from the bottom of the canvas.
    pub baseline_margin: f64,
    /// Vertical distance between a parent and a node placed above it.
    pub level_gap: f64,
    pub lane_offense: f64,
    pub lane_shared: f64,
    pub lane_defense: f64,
    /// Upper bound of a lane's width as a fraction of the canvas width.
    pub lane_max_width: f64,
    pub lane_slot_width: f64,
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    pub side_offset: f64,
    pub tier2_extra: f64,
    pub tier3_extra: f64,
    pub tier4_extra: f64,
    pub tier_step: f64,
    pub shared_stack_step: f64,
    pub divider_gap: f64,
    pub label_lift: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1200.0,
            canvas_height: 700.0,
            baseline_margin: 200.0,
            level_gap: 250.0,
            lane_offense: 0.18,
            lane_shared: 0.5,
            lane_defense: 0.82,
            lane_max_width: 0.5,
            lane_slot_width: 300.0,
            horizontal_spacing: 70.0,
            vertical_spacing: 110.0,
            side_offset: 150.0,
            tier2_extra: 500.0,
            tier3_extra: 500.0,
            tier4_extra: 500.0,
            tier_step: 200.0,
            shared_stack_step: 90.0,
            divider_gap: 60.0,
            label_lift: 18.0,
        }
    }
}

impl LayoutConfig {
    fn baseline_y(&self) -> f64 {
        self.canvas_height - self.baseline_margin
    }

    fn lane_x(&self, lane: SkillType) -> f64 {
        self.canvas_width
            * match lane {
                SkillType::Offense => self.lane_offense,
                SkillType::Shared => self.lane_shared,
                SkillType::Defense => self.lane_defense,
            }
    }

    /// Extra lift for nodes of tier 2..=4.
    fn tier_extra(&self, tier: i32) -> f64 {
        match tier {
            2 => self.tier2_extra,
            3 => self.tier3_extra,
            4 => self.tier4_extra,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub depth: u32,
    pub pos: Point,
}

/// Directed line from a prerequisite to its dependent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub from: String,
    pub to: String,
    pub start: Point,
    pub end: Point,
    pub length: f64,
    pub angle_deg: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStatus {
    /// The target node can be selected right now.
    pub eligible: bool,
    /// Both endpoints are selected.
    pub active: bool,
}

/// Divider drawn just below the lowest node of an explicit tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierBand {
    pub tier: i32,
    pub min_y: f64,
    pub max_y: f64,
    pub line_y: f64,
    pub label_y: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLayout {
    pub tree: String,
    pub nodes: Vec<NodePosition>,
    pub connectors: Vec<Connector>,
    pub tiers: Vec<TierBand>,
    /// Where the tree title goes: under the lowest node on screen.
    pub title_anchor: Option<Point>,
}

impl TreeLayout {
    pub fn position(&self, id: &str) -> Option<Point> {
        self.nodes.iter().find(|n| n.id == id).map(|n| n.pos)
    }

    /// SHA-256 of the canonical JSON encoding; equal layouts give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    pub fn connector_status(
        &self,
        connector: &Connector,
        graph: &SkillGraph,
        session: &Session,
    ) -> ConnectorStatus {
        let tree = graph.id();
        ConnectorStatus {
            eligible: session.node_status(graph, &connector.to) == Some(NodeStatus::Available),
            active: session.is_selected(tree, &connector.from)
                && session.is_selected(tree, &connector.to),
        }
    }
}

const LANES: [SkillType; 3] = [SkillType::Offense, SkillType::Shared, SkillType::Defense];

type GroupKey = (Vec<String>, Option<PositionTag>);

fn group_key(node: &SkillNode) -> GroupKey {
    let mut reqs = node.requires.clone();
    reqs.sort();
    (reqs, node.position_tag)
}

/// Halves round towards positive infinity.
fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Deterministic placement of tree nodes on a fixed-size canvas.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn layout_catalog(&self, catalog: &SkillCatalog) -> Vec<TreeLayout> {
        catalog.graphs().iter().map(|g| self.layout(g)).collect()
    }

    pub fn layout(&self, graph: &SkillGraph) -> TreeLayout {
        let positions = self.place_nodes(graph);

        let nodes: Vec<NodePosition> = graph
            .nodes()
            .iter()
            .filter_map(|n| {
                positions.get(n.id.as_str()).map(|&pos| NodePosition {
                    id: n.id.clone(),
                    depth: graph.depth(&n.id).unwrap_or(0),
                    pos,
                })
            })
            .collect();

        let connectors = connectors(graph, &positions);
        let tiers = self.tier_bands(graph, &positions);

        let mut title_anchor: Option<Point> = None;
        for n in &nodes {
            if title_anchor.is_none_or(|best| n.pos.y > best.y) {
                title_anchor = Some(n.pos);
            }
        }

        tracing::debug!(
            tree = %graph.id(),
            nodes = nodes.len(),
            connectors = connectors.len(),
            tiers = tiers.len(),
            "laid out tree"
        );

        TreeLayout {
            tree: graph.id().to_string(),
            nodes,
            connectors,
            tiers,
            title_anchor,
        }
    }

    fn place_nodes<'g>(&self, graph: &'g SkillGraph) -> HashMap<&'g str, Point> {
        let cfg = &self.config;
        let base_y = cfg.baseline_y();

        let mut sibling_groups: HashMap<GroupKey, Vec<&str>> = HashMap::new();
        for node in graph.nodes() {
            sibling_groups
                .entry(group_key(node))
                .or_default()
                .push(node.id.as_str());
        }
        let group_slot = |node: &SkillNode| -> (usize, usize) {
            let group = &sibling_groups[&group_key(node)];
            let idx = group.iter().position(|id| *id == node.id).unwrap_or(0);
            (idx, group.len())
        };

        let mut by_depth: BTreeMap<u32, Vec<&SkillNode>> = BTreeMap::new();
        for node in graph.nodes() {
            by_depth
                .entry(graph.depth(&node.id).unwrap_or(0))
                .or_default()
                .push(node);
        }

        let mut positions: HashMap<&'g str, Point> = HashMap::new();
        for (&depth, tier_nodes) in &by_depth {
            for lane in LANES {
                let lane_nodes: Vec<&SkillNode> =
                    tier_nodes.iter().copied().filter(|n| n.kind == lane).collect();
                if lane_nodes.is_empty() {
                    continue;
                }

                let count = lane_nodes.len() as f64;
                let group_w =
                    (cfg.canvas_width * cfg.lane_max_width).min(cfg.lane_slot_width * count);
                let spacing = group_w / (count + 1.0);
                let start_x = cfg.lane_x(lane) - group_w / 2.0;

                for (i, node) in lane_nodes.iter().copied().enumerate() {
                    let stack_y = if lane == SkillType::Shared
                        && lane_nodes.len() > 1
                        && node.position_tag != Some(PositionTag::Between)
                    {
                        i as f64 * cfg.shared_stack_step
                    } else {
                        0.0
                    };

                    let parents: Vec<Point> = node
                        .requires
                        .iter()
                        .filter_map(|r| positions.get(r.as_str()).copied())
                        .collect();
                    let (group_idx, group_len) = group_slot(node);

                    let mut pos = if parents.is_empty() {
                        let slot_x = start_x + spacing * (i as f64 + 1.0);
                        self.baseline_position(node, slot_x, group_idx, group_len)
                    } else {
                        self.parent_relative_position(node, &parents, group_idx)
                    };

                    if parents.is_empty() {
                        let tier_base = self.tier_base(graph, node);
                        pos.y = round_half_up(
                            base_y - tier_base - depth as f64 * (cfg.level_gap / 2.0) + stack_y,
                        );
                    }

                    if group_len > 1 && group_idx > 0 {
                        let idx = group_idx as f64;
                        match node.position_tag {
                            Some(PositionTag::Up | PositionTag::Between) => {
                                pos.y -= idx * cfg.vertical_spacing;
                            }
                            Some(PositionTag::Left | PositionTag::UpLeft) => {
                                pos.x -= idx * cfg.horizontal_spacing;
                            }
                            Some(PositionTag::Right | PositionTag::UpRight) => {
                                pos.x += idx * cfg.horizontal_spacing;
                            }
                            _ => {}
                        }
                    }

                    pos.x += node.position_offset_x;
                    pos.y += node.position_offset_y;
                    positions.insert(node.id.as_str(), pos);
                }
            }
        }
        positions
    }

    /// Lane slot on the baseline row, spread sideways within the sibling group. The final
    /// height of unparented nodes comes from tier anchoring.
    fn baseline_position(
        &self,
        node: &SkillNode,
        slot_x: f64,
        group_idx: usize,
        group_len: usize,
    ) -> Point {
        let cfg = &self.config;
        let mut pos = Point::new(round_half_up(slot_x), cfg.baseline_y());
        if group_len > 1 && group_idx > 0 {
            let shift = group_idx as f64 * cfg.horizontal_spacing;
            match node.position_tag {
                Some(PositionTag::Up | PositionTag::Between) => {}
                Some(PositionTag::Left | PositionTag::UpLeft) => pos.x -= shift,
                _ => pos.x += shift,
            }
        }
        pos
    }

    fn parent_relative_position(
        &self,
        node: &SkillNode,
        parents: &[Point],
        group_idx: usize,
    ) -> Point {
        let cfg = &self.config;
        let self_tier = node.tier.filter(|t| *t != 0).unwrap_or(1);
        let extra = cfg.tier_extra(self_tier);

        if node.position_tag == Some(PositionTag::Between) && parents.len() > 1 {
            let n = parents.len() as f64;
            let avg_x = parents.iter().map(|p| p.x).sum::<f64>() / n;
            let avg_y = parents.iter().map(|p| p.y).sum::<f64>() / n;
            return Point::new(avg_x, round_half_up(avg_y - extra));
        }

        let p = parents[0];
        let y_above = p.y - cfg.level_gap - extra;
        let side = cfg.side_offset + group_idx as f64 * cfg.horizontal_spacing;
        let lifted = self_tier > 1;
        match node.position_tag {
            Some(PositionTag::UpLeft) => Point::new(p.x - side, y_above),
            Some(PositionTag::UpRight) => Point::new(p.x + side, y_above),
            Some(PositionTag::Left) => Point::new(p.x - side, if lifted { y_above } else { p.y }),
            Some(PositionTag::Right) => Point::new(p.x + side, if lifted { y_above } else { p.y }),
            Some(PositionTag::DownLeft) => Point::new(
                p.x - side,
                if lifted { y_above } else { p.y + cfg.level_gap },
            ),
            Some(PositionTag::DownRight) => Point::new(
                p.x + side,
                if lifted { y_above } else { p.y + cfg.level_gap },
            ),
            Some(PositionTag::Up | PositionTag::Between) | None => Point::new(p.x, y_above),
        }
    }

    /// Vertical lift of an unparented node from its explicit tier, or else from the highest
    /// explicit tier among its requirements.
    fn tier_base(&self, graph: &SkillGraph, node: &SkillNode) -> f64 {
        let cfg = &self.config;
        match node.tier.filter(|t| *t != 0) {
            Some(tier) => {
                let mut base = (tier as f64 - 1.0) * cfg.tier_step;
                if tier == 2 {
                    base += cfg.tier2_extra;
                }
                base
            }
            None if !node.requires.is_empty() => {
                let highest = node
                    .requires
                    .iter()
                    .map(|r| graph.node(r).and_then(|p| p.tier).unwrap_or(0))
                    .max()
                    .unwrap_or(0);
                highest as f64 * cfg.tier_step
            }
            None => 0.0,
        }
    }

    fn tier_bands(&self, graph: &SkillGraph, positions: &HashMap<&str, Point>) -> Vec<TierBand> {
        let mut bounds: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
        for node in graph.nodes() {
            let (Some(tier), Some(pos)) = (node.tier, positions.get(node.id.as_str())) else {
                continue;
            };
            let entry = bounds.entry(tier).or_insert((f64::INFINITY, f64::NEG_INFINITY));
            entry.0 = entry.0.min(pos.y);
            entry.1 = entry.1.max(pos.y);
        }

        bounds
            .into_iter()
            .map(|(tier, (min_y, max_y))| {
                let line_y = max_y + self.config.divider_gap;
                TierBand {
                    tier,
                    min_y,
                    max_y,
                    line_y,
                    label_y: line_y - self.config.label_lift,
                    label: format!("Tier {tier}"),
                }
            })
            .collect()
    }
}

fn connectors(graph: &SkillGraph, positions: &HashMap<&str, Point>) -> Vec<Connector> {
    let mut out = Vec::new();
    for to in graph.nodes() {
        let Some(&end) = positions.get(to.id.as_str()) else {
            continue;
        };
        for req in &to.requires {
            let Some(&start) = positions.get(req.as_str()) else {
                continue;
            };
            let dx = end.x - start.x;
            let dy = end.y - start.y;
            out.push(Connector {
                from: req.clone(),
                to: to.id.clone(),
                start,
                end,
                length: dx.hypot(dy),
                angle_deg: dy.atan2(dx).to_degrees(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SkillTree;

    fn layout(json: &str) -> TreeLayout {
        let tree = SkillTree::from_json("t", "T", json, 5).expect("tree should parse");
        let graph = SkillGraph::new(tree).expect("graph should index");
        LayoutEngine::default().layout(&graph)
    }

    fn pos(layout: &TreeLayout, id: &str) -> Point {
        layout.position(id).expect("node should be positioned")
    }

    #[test]
    fn single_root_sits_on_its_lane_baseline() {
        let l = layout(r#"[{"id": "a", "name": "A", "type": "offense"}]"#);
        assert_eq!(pos(&l, "a"), Point::new(216.0, 500.0));
    }

    #[test]
    fn shared_roots_spread_across_lane_and_stack_down() {
        let l = layout(r#"[{"id": "a", "name": "A"}, {"id": "b", "name": "B"}]"#);
        assert_eq!(pos(&l, "a"), Point::new(500.0, 500.0));
        assert_eq!(pos(&l, "b"), Point::new(770.0, 590.0));
    }

    #[test]
    fn tags_place_children_relative_to_parent() {
        let l = layout(
            r#"[
                {"id": "a", "name": "A", "type": "offense"},
                {"id": "up", "name": "Up", "type": "offense", "requires": "a"},
                {"id": "l", "name": "L", "type": "offense", "requires": "a", "positionTag": "left"},
                {"id": "r", "name": "R", "type": "defense", "requires": "a", "positionTag": "right"},
                {"id": "dl", "name": "DL", "type": "offense", "requires": "a", "positionTag": "downleft"},
                {"id": "ur", "name": "UR", "type": "offense", "requires": "a", "positionTag": "upright", "tier": 2}
            ]"#,
        );
        assert_eq!(pos(&l, "up"), Point::new(216.0, 250.0));
        assert_eq!(pos(&l, "l"), Point::new(66.0, 500.0));
        assert_eq!(pos(&l, "r"), Point::new(366.0, 500.0));
        assert_eq!(pos(&l, "dl"), Point::new(66.0, 750.0));
        assert_eq!(pos(&l, "ur"), Point::new(366.0, -250.0));
    }

    #[test]
    fn between_node_centers_on_parents_and_lifts_by_tier() {
        let l = layout(
            r#"[
                {"id": "a", "name": "A", "type": "offense"},
                {"id": "b", "name": "B", "type": "defense"},
                {"id": "m", "name": "M", "requires": ["a", "b"], "positionTag": "between"},
                {"id": "m2", "name": "M2", "requires": ["a", "b"], "positionTag": "between", "tier": 3}
            ]"#,
        );
        assert_eq!(pos(&l, "a"), Point::new(216.0, 500.0));
        // Second root of the untagged sibling group shifts sideways.
        assert_eq!(pos(&l, "b"), Point::new(1054.0, 500.0));
        assert_eq!(pos(&l, "m"), Point::new(635.0, 500.0));
        // Tier 3 lift, then stacked above its first sibling.
        assert_eq!(pos(&l, "m2"), Point::new(635.0, 500.0 - 500.0 - 110.0));
    }

    #[test]
    fn sibling_groups_spread_apart() {
        let l = layout(
            r#"[
                {"id": "a", "name": "A", "type": "offense"},
                {"id": "u1", "name": "U1", "type": "offense", "requires": "a", "positionTag": "up"},
                {"id": "u2", "name": "U2", "type": "offense", "requires": "a", "positionTag": "up"},
                {"id": "l1", "name": "L1", "type": "offense", "requires": "a", "positionTag": "left"},
                {"id": "l2", "name": "L2", "type": "offense", "requires": "a", "positionTag": "left"}
            ]"#,
        );
        assert_eq!(pos(&l, "u1"), Point::new(216.0, 250.0));
        assert_eq!(pos(&l, "u2"), Point::new(216.0, 140.0));
        assert_eq!(pos(&l, "l1"), Point::new(66.0, 500.0));
        assert_eq!(pos(&l, "l2"), Point::new(216.0 - 150.0 - 70.0 - 70.0, 500.0));
    }

    #[test]
    fn explicit_tier_anchors_roots() {
        let l = layout(
            r#"[
                {"id": "t2", "name": "T2", "type": "offense", "tier": 2},
                {"id": "t3", "name": "T3", "type": "defense", "tier": 3}
            ]"#,
        );
        assert_eq!(pos(&l, "t2").y, 500.0 - 200.0 - 500.0);
        assert_eq!(pos(&l, "t3").y, 500.0 - 400.0);
    }

    #[test]
    fn manual_offsets_apply_last() {
        let l = layout(
            r#"[{"id": "a", "name": "A", "type": "offense", "positionOffsetX": 5, "positionOffsetY": -7}]"#,
        );
        assert_eq!(pos(&l, "a"), Point::new(221.0, 493.0));
    }

    #[test]
    fn connectors_carry_length_and_angle() {
        let l = layout(
            r#"[
                {"id": "a", "name": "A", "type": "offense"},
                {"id": "r", "name": "R", "type": "offense", "requires": "a", "positionTag": "right"}
            ]"#,
        );
        assert_eq!(l.connectors.len(), 1);
        let c = &l.connectors[0];
        assert_eq!((c.from.as_str(), c.to.as_str()), ("a", "r"));
        assert_eq!(c.start, Point::new(216.0, 500.0));
        assert!((c.length - 150.0).abs() < 1e-9);
        assert!(c.angle_deg.abs() < 1e-9);
    }

    #[test]
    fn tier_bands_sit_below_lowest_node_in_ascending_order() {
        let l = layout(
            r#"[
                {"id": "t3", "name": "T3", "type": "defense", "tier": 3},
                {"id": "t1", "name": "T1", "type": "offense", "tier": 1},
                {"id": "plain", "name": "P", "type": "offense"}
            ]"#,
        );
        let tiers: Vec<i32> = l.tiers.iter().map(|t| t.tier).collect();
        assert_eq!(tiers, vec![1, 3]);
        assert_eq!(l.tiers[0].line_y, 500.0 + 60.0);
        assert_eq!(l.tiers[0].label_y, 500.0 + 60.0 - 18.0);
        assert_eq!(l.tiers[1].label, "Tier 3");
    }

    #[test]
    fn title_anchor_follows_lowest_node() {
        let l = layout(
            r#"[
                {"id": "a", "name": "A", "type": "offense"},
                {"id": "d", "name": "D", "type": "offense", "requires": "a", "positionTag": "downright"}
            ]"#,
        );
        assert_eq!(l.title_anchor, Some(Point::new(366.0, 750.0)));
    }

    #[test]
    fn extreme_tiers_lay_out_without_overflow() {
        let l = layout(
            r#"[
                {"id": "low", "name": "Low", "type": "offense", "tier": -2147483648},
                {"id": "high", "name": "High", "type": "defense", "tier": 2147483647}
            ]"#,
        );
        let low = pos(&l, "low");
        let high = pos(&l, "high");
        assert!(low.y.is_finite() && low.y > 500.0);
        assert!(high.y.is_finite() && high.y < 500.0);
        assert_eq!(l.tiers.len(), 2);
    }

    #[test]
    fn round_half_up_rounds_halves_upward() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-2.6), -3.0);
    }
}
