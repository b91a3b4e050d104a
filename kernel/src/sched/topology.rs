//! Topology registry: CPU descriptors, NUMA nodes, core class, and the
//! SMT -> core -> package -> NUMA -> all domain hierarchy the load
//! balancer walks (§4.A).
//!
//! Grounded in the teacher's `sched::numa::NumaTopology` (node/distance
//! modeling) and `sched::smp` (per-CPU descriptor shape); hardware probing
//! (`detect_cpu_count`, ACPI SRAT/SLIT parsing) is left behind since arch
//! bring-up is out of scope here — topology is supplied by the embedder.

use alloc::vec::Vec;

use super::task::{CpuId, NodeId};

/// Heterogeneous core class, for energy-aware wakeup placement (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreClass {
    Performance,
    Efficiency,
}

/// Static description of one CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDescriptor {
    pub id: CpuId,
    pub node: NodeId,
    /// SMT sibling group; CPUs sharing a physical core share this id.
    pub core_id: u32,
    /// Physical package (socket) this CPU belongs to.
    pub package_id: u32,
    pub class: CoreClass,
    pub online: bool,
}

/// One level of the load-balancing domain hierarchy: a group of CPUs that
/// share some resource (SMT threads, a core, a package, a NUMA node, or the
/// whole machine).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DomainLevel {
    Smt,
    Core,
    Package,
    Numa,
    All,
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub level: DomainLevel,
    pub cpus: Vec<CpuId>,
}

/// The full machine topology: CPU descriptors, NUMA distance matrix, and
/// the derived domain hierarchy used by the load balancer's domain walk.
pub struct Topology {
    cpus: Vec<CpuDescriptor>,
    /// `distance[from][to]`, relative latency; self-distance is the
    /// smallest entry on each row.
    distance: Vec<Vec<u32>>,
}

impl Topology {
    /// Build a topology from explicit descriptors and an optional distance
    /// matrix (an empty matrix means "uniform access", distance 10
    /// everywhere, matching a single-node system).
    pub fn new(cpus: Vec<CpuDescriptor>, distance: Vec<Vec<u32>>) -> Self {
        Self { cpus, distance }
    }

    /// A single NUMA node of `cpu_count` Performance cores, all online.
    /// Convenient for tests and for embedders with no heterogeneous or
    /// multi-socket topology to describe.
    pub fn uniform(cpu_count: u32) -> Self {
        let cpus = (0..cpu_count)
            .map(|id| CpuDescriptor {
                id,
                node: 0,
                core_id: id,
                package_id: 0,
                class: CoreClass::Performance,
                online: true,
            })
            .collect();
        Self {
            cpus,
            distance: alloc::vec![alloc::vec![10]],
        }
    }

    pub fn cpu_count(&self) -> u32 {
        self.cpus.len() as u32
    }

    pub fn descriptor(&self, cpu: CpuId) -> Option<&CpuDescriptor> {
        self.cpus.iter().find(|d| d.id == cpu)
    }

    pub fn mark_offline(&mut self, cpu: CpuId) {
        if let Some(d) = self.cpus.iter_mut().find(|d| d.id == cpu) {
            d.online = false;
        }
    }

    pub fn mark_online(&mut self, cpu: CpuId) {
        if let Some(d) = self.cpus.iter_mut().find(|d| d.id == cpu) {
            d.online = true;
        }
    }

    pub fn online_cpus(&self) -> impl Iterator<Item = CpuId> + '_ {
        self.cpus.iter().filter(|d| d.online).map(|d| d.id)
    }

    pub fn distance(&self, from: NodeId, to: NodeId) -> u32 {
        self.distance
            .get(from as usize)
            .and_then(|row| row.get(to as usize))
            .copied()
            .unwrap_or(if from == to { 10 } else { 20 })
    }

    pub fn same_node(&self, a: CpuId, b: CpuId) -> bool {
        match (self.descriptor(a), self.descriptor(b)) {
            (Some(da), Some(db)) => da.node == db.node,
            _ => false,
        }
    }

    /// CPUs sharing a domain with `cpu` at the given level, `cpu` included,
    /// restricted to online CPUs. Used by both the load balancer's domain
    /// walk and wakeup placement's idle-sibling search.
    pub fn domain_peers(&self, cpu: CpuId, level: DomainLevel) -> Vec<CpuId> {
        let Some(origin) = self.descriptor(cpu) else {
            return Vec::new();
        };
        self.cpus
            .iter()
            .filter(|d| d.online)
            .filter(|d| match level {
                DomainLevel::Smt | DomainLevel::Core => d.core_id == origin.core_id,
                DomainLevel::Package => d.package_id == origin.package_id,
                DomainLevel::Numa => d.node == origin.node,
                DomainLevel::All => true,
            })
            .map(|d| d.id)
            .collect()
    }

    /// The domain hierarchy for one CPU, narrowest first: SMT siblings,
    /// then its core's package, then its NUMA node, then the whole machine.
    /// The load balancer walks this outward until it finds an imbalance.
    pub fn domains_for(&self, cpu: CpuId) -> Vec<Domain> {
        alloc::vec![
            Domain { level: DomainLevel::Smt, cpus: self.domain_peers(cpu, DomainLevel::Smt) },
            Domain { level: DomainLevel::Package, cpus: self.domain_peers(cpu, DomainLevel::Package) },
            Domain { level: DomainLevel::Numa, cpus: self.domain_peers(cpu, DomainLevel::Numa) },
            Domain { level: DomainLevel::All, cpus: self.domain_peers(cpu, DomainLevel::All) },
        ]
    }
}
