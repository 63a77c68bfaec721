//! Network model: nodes, feeding links and the parameter tables used to
//! derive per-node loss rates and assimilation efficiencies.
//!
//! A [`NetworkModel`] is validated once on construction and is immutable
//! afterwards. Nodes keep their insertion order; every matrix produced by
//! this crate is indexed in that order.

use crate::error::{TrophicError, TrophicResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub type NodeId = String;

/// Organism class of a node, which selects its assimilation efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganismType {
    Animal,
    Plant,
    Detritus,
}

impl OrganismType {
    pub fn label(self) -> &'static str {
        match self {
            OrganismType::Animal => "animal",
            OrganismType::Plant => "plant",
            OrganismType::Detritus => "detritus",
        }
    }
}

impl FromStr for OrganismType {
    type Err = TrophicError;

    fn from_str(s: &str) -> TrophicResult<Self> {
        match s {
            "animal" => Ok(OrganismType::Animal),
            "plant" => Ok(OrganismType::Plant),
            "detritus" => Ok(OrganismType::Detritus),
            other => Err(TrophicError::InvalidParameter(format!(
                "unknown organism type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OrganismType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metabolic class of a node, which selects its allometric loss coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetabolicType {
    #[serde(rename = "ecto.vert")]
    EctothermVertebrate,
    #[serde(rename = "endo.vert")]
    EndothermVertebrate,
    #[serde(rename = "inv")]
    Invertebrate,
}

impl MetabolicType {
    pub fn label(self) -> &'static str {
        match self {
            MetabolicType::EctothermVertebrate => "ecto.vert",
            MetabolicType::EndothermVertebrate => "endo.vert",
            MetabolicType::Invertebrate => "inv",
        }
    }
}

impl FromStr for MetabolicType {
    type Err = TrophicError;

    fn from_str(s: &str) -> TrophicResult<Self> {
        match s {
            "ecto.vert" => Ok(MetabolicType::EctothermVertebrate),
            "endo.vert" => Ok(MetabolicType::EndothermVertebrate),
            "inv" => Ok(MetabolicType::Invertebrate),
            other => Err(TrophicError::InvalidParameter(format!(
                "unknown metabolic type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MetabolicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coefficients of the allometric loss relation `a * body_mass^b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllometricCoefficients {
    pub a: f64,
    pub b: f64,
}

impl AllometricCoefficients {
    pub fn loss_rate(&self, body_mass: f64) -> f64 {
        self.a * body_mass.powf(self.b)
    }
}

/// Lookup tables keyed by metabolic and organism type.
///
/// The defaults are metabolic coefficients from Ehnes et al. (2011) and
/// assimilation efficiencies from Lang et al. (2017).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTables {
    pub metabolic: BTreeMap<MetabolicType, AllometricCoefficients>,
    pub efficiency: BTreeMap<OrganismType, f64>,
}

impl Default for ParameterTables {
    fn default() -> Self {
        let metabolic = BTreeMap::from([
            (
                MetabolicType::EctothermVertebrate,
                AllometricCoefficients { a: 18.18, b: -0.29 },
            ),
            (
                MetabolicType::EndothermVertebrate,
                AllometricCoefficients { a: 19.5, b: -0.29 },
            ),
            (
                MetabolicType::Invertebrate,
                AllometricCoefficients { a: 18.47, b: -0.29 },
            ),
        ]);
        let efficiency = BTreeMap::from([
            (OrganismType::Animal, 0.906),
            (OrganismType::Plant, 0.545),
            (OrganismType::Detritus, 0.158),
        ]);
        Self {
            metabolic,
            efficiency,
        }
    }
}

impl ParameterTables {
    fn validate(&self) -> TrophicResult<()> {
        for (kind, coefficients) in &self.metabolic {
            if !coefficients.a.is_finite() || !coefficients.b.is_finite() {
                return Err(TrophicError::InvalidParameter(format!(
                    "metabolic coefficients for '{kind}' must be finite"
                )));
            }
        }
        for (kind, &efficiency) in &self.efficiency {
            check_efficiency(efficiency, &format!("efficiency for '{kind}'"))?;
        }
        Ok(())
    }

    fn loss_rate(&self, kind: MetabolicType, body_mass: f64) -> TrophicResult<f64> {
        let coefficients = self.metabolic.get(&kind).ok_or_else(|| {
            TrophicError::InvalidParameter(format!(
                "no metabolic coefficients for type '{kind}'"
            ))
        })?;
        Ok(coefficients.loss_rate(body_mass))
    }

    fn efficiency(&self, kind: OrganismType) -> TrophicResult<f64> {
        self.efficiency.get(&kind).copied().ok_or_else(|| {
            TrophicError::InvalidParameter(format!("no efficiency for organism type '{kind}'"))
        })
    }
}

/// User-facing description of a node before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub body_mass: f64,
    pub biomass: f64,
    pub organism_type: OrganismType,
    pub metabolic_type: MetabolicType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<f64>,
    /// Overrides the allometric loss rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_rate: Option<f64>,
    /// Overrides the tabulated efficiency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
}

impl NodeSpec {
    pub fn new(
        id: impl Into<NodeId>,
        body_mass: f64,
        biomass: f64,
        organism_type: OrganismType,
        metabolic_type: MetabolicType,
    ) -> Self {
        Self {
            id: id.into(),
            body_mass,
            biomass,
            organism_type,
            metabolic_type,
            growth_rate: None,
            loss_rate: None,
            efficiency: None,
        }
    }

    pub fn with_growth_rate(mut self, growth_rate: f64) -> Self {
        self.growth_rate = Some(growth_rate);
        self
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = Some(loss_rate);
        self
    }

    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.efficiency = Some(efficiency);
        self
    }
}

fn default_preference() -> f64 {
    1.0
}

/// A feeding link: `predator` consumes `prey`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub prey: NodeId,
    pub predator: NodeId,
    #[serde(default = "default_preference")]
    pub preference: f64,
}

impl EdgeSpec {
    pub fn new(prey: impl Into<NodeId>, predator: impl Into<NodeId>) -> Self {
        Self {
            prey: prey.into(),
            predator: predator.into(),
            preference: default_preference(),
        }
    }

    pub fn with_preference(mut self, preference: f64) -> Self {
        self.preference = preference;
        self
    }
}

/// Serializable form of a network, as exchanged with surrounding tooling.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkDescription {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

/// A validated node with its derived loss rate and efficiency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub body_mass: f64,
    pub biomass: f64,
    pub organism_type: OrganismType,
    pub metabolic_type: MetabolicType,
    pub loss_rate: f64,
    pub efficiency: f64,
    pub growth_rate: Option<f64>,
    #[serde(skip)]
    loss_overridden: bool,
    #[serde(skip)]
    efficiency_overridden: bool,
}

/// A validated feeding link between node indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub prey: usize,
    pub predator: usize,
    pub preference: f64,
}

/// Immutable trophic network.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<NodeId, usize>,
    diets: Vec<Vec<usize>>,
}

impl NetworkModel {
    pub fn new(
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
        tables: &ParameterTables,
    ) -> TrophicResult<Self> {
        tables.validate()?;

        let mut index = HashMap::with_capacity(nodes.len());
        let mut resolved = Vec::with_capacity(nodes.len());
        for spec in nodes {
            if index.contains_key(&spec.id) {
                return Err(TrophicError::InvalidTopology(format!(
                    "duplicate node id '{}'",
                    spec.id
                )));
            }
            let node = resolve_node(spec, tables)?;
            index.insert(node.id.clone(), resolved.len());
            resolved.push(node);
        }

        let mut seen = HashSet::with_capacity(edges.len());
        let mut diets = vec![Vec::new(); resolved.len()];
        let mut links = Vec::with_capacity(edges.len());
        for spec in edges {
            let prey = lookup(&index, &spec.prey, "prey")?;
            let predator = lookup(&index, &spec.predator, "predator")?;
            if prey == predator {
                return Err(TrophicError::InvalidTopology(format!(
                    "self-loop on node '{}'",
                    spec.prey
                )));
            }
            if !seen.insert((prey, predator)) {
                return Err(TrophicError::InvalidTopology(format!(
                    "duplicate edge '{}' -> '{}'",
                    spec.prey, spec.predator
                )));
            }
            if !spec.preference.is_finite() || spec.preference < 0.0 {
                return Err(TrophicError::InvalidParameter(format!(
                    "preference of edge '{}' -> '{}' must be finite and non-negative, got {}",
                    spec.prey, spec.predator, spec.preference
                )));
            }
            diets[predator].push(links.len());
            links.push(Edge {
                prey,
                predator,
                preference: spec.preference,
            });
        }

        log::debug!(
            "built network with {} nodes and {} edges",
            resolved.len(),
            links.len()
        );

        Ok(Self {
            nodes: resolved,
            edges: links,
            index,
            diets,
        })
    }

    pub fn from_description(
        description: NetworkDescription,
        tables: &ParameterTables,
    ) -> TrophicResult<Self> {
        Self::new(description.nodes, description.edges, tables)
    }

    /// Converts back to a description. Derived values that came from the
    /// parameter tables are left for the tables to derive again.
    pub fn to_description(&self) -> NetworkDescription {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeSpec {
                id: node.id.clone(),
                body_mass: node.body_mass,
                biomass: node.biomass,
                organism_type: node.organism_type,
                metabolic_type: node.metabolic_type,
                growth_rate: node.growth_rate,
                loss_rate: node.loss_overridden.then_some(node.loss_rate),
                efficiency: node.efficiency_overridden.then_some(node.efficiency),
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|edge| EdgeSpec {
                prey: self.nodes[edge.prey].id.clone(),
                predator: self.nodes[edge.predator].id.clone(),
                preference: edge.preference,
            })
            .collect();
        NetworkDescription { nodes, edges }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_of(id).map(|idx| &self.nodes[idx])
    }

    /// Feeding links into `consumer`, in insertion order.
    pub fn diet(&self, consumer: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.diets[consumer].iter().map(move |&e| &self.edges[e])
    }

    pub fn is_consumer(&self, idx: usize) -> bool {
        !self.diets[idx].is_empty()
    }

    pub fn biomasses(&self) -> Vec<f64> {
        self.nodes.iter().map(|node| node.biomass).collect()
    }

    pub fn loss_rates(&self) -> Vec<f64> {
        self.nodes.iter().map(|node| node.loss_rate).collect()
    }

    pub fn efficiencies(&self) -> Vec<f64> {
        self.nodes.iter().map(|node| node.efficiency).collect()
    }

    pub fn growth_rates(&self) -> Vec<Option<f64>> {
        self.nodes.iter().map(|node| node.growth_rate).collect()
    }
}

fn lookup(index: &HashMap<NodeId, usize>, id: &str, role: &str) -> TrophicResult<usize> {
    index.get(id).copied().ok_or_else(|| {
        TrophicError::InvalidTopology(format!("edge {role} '{id}' is not a node of the network"))
    })
}

fn resolve_node(spec: NodeSpec, tables: &ParameterTables) -> TrophicResult<Node> {
    if !spec.body_mass.is_finite() || spec.body_mass <= 0.0 {
        return Err(TrophicError::InvalidParameter(format!(
            "body mass of '{}' must be finite and positive, got {}",
            spec.id, spec.body_mass
        )));
    }
    if !spec.biomass.is_finite() || spec.biomass < 0.0 {
        return Err(TrophicError::InvalidParameter(format!(
            "biomass of '{}' must be finite and non-negative, got {}",
            spec.id, spec.biomass
        )));
    }
    if let Some(rate) = spec.growth_rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(TrophicError::InvalidParameter(format!(
                "growth rate of '{}' must be finite and positive, got {}",
                spec.id, rate
            )));
        }
    }

    let loss_rate = match spec.loss_rate {
        Some(rate) => rate,
        None => tables.loss_rate(spec.metabolic_type, spec.body_mass)?,
    };
    if !loss_rate.is_finite() || loss_rate < 0.0 {
        return Err(TrophicError::InvalidParameter(format!(
            "loss rate of '{}' must be finite and non-negative, got {}",
            spec.id, loss_rate
        )));
    }

    let efficiency = match spec.efficiency {
        Some(value) => {
            check_efficiency(value, &format!("efficiency of '{}'", spec.id))?;
            value
        }
        None => tables.efficiency(spec.organism_type)?,
    };

    Ok(Node {
        loss_overridden: spec.loss_rate.is_some(),
        efficiency_overridden: spec.efficiency.is_some(),
        id: spec.id,
        body_mass: spec.body_mass,
        biomass: spec.biomass,
        organism_type: spec.organism_type,
        metabolic_type: spec.metabolic_type,
        loss_rate,
        efficiency,
        growth_rate: spec.growth_rate,
    })
}

fn check_efficiency(value: f64, what: &str) -> TrophicResult<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(TrophicError::InvalidParameter(format!(
            "{what} must lie in (0, 1], got {value}"
        )));
    }
    Ok(())
}
