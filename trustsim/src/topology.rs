//! Radio reachability between simulated nodes.

use hashbrown::HashMap;
use trustmesh::{Address, Duration};

/// Properties of a radio link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Frame loss rate (0.0 to 1.0), applied per frame and per direction.
    pub loss_rate: f64,
    /// Air time plus queueing delay.
    pub delay: Duration,
    /// Whether the nodes are currently in range of each other.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(5),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Which nodes hear which. Links are symmetric.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(Address, Address), Link>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node in range of every other node.
    pub fn fully_connected(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Each node in range of its predecessor and successor only.
    pub fn chain(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        for pair in nodes.windows(2) {
            topo.add_link(pair[0], pair[1], Link::default());
        }
        topo
    }

    /// First node in range of all others; the others hear only the hub.
    pub fn star(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        let Some((&hub, spokes)) = nodes.split_first() else {
            return topo;
        };
        for &spoke in spokes {
            topo.add_link(hub, spoke, Link::default());
        }
        topo
    }

    /// Row-major grid `width` nodes wide, 4-neighborhood.
    ///
    /// A trailing partial row is allowed.
    pub fn grid(nodes: &[Address], width: usize) -> Self {
        let mut topo = Self::new();
        if width == 0 {
            return topo;
        }
        for (i, &a) in nodes.iter().enumerate() {
            if (i + 1) % width != 0 {
                if let Some(&right) = nodes.get(i + 1) {
                    topo.add_link(a, right, Link::default());
                }
            }
            if let Some(&below) = nodes.get(i + width) {
                topo.add_link(a, below, Link::default());
            }
        }
        topo
    }

    /// Add (or replace) the link between two nodes.
    pub fn add_link(&mut self, a: Address, b: Address, link: Link) {
        self.links.insert(canonical_pair(a, b), link);
    }

    pub fn get_link(&self, a: Address, b: Address) -> Option<&Link> {
        self.links.get(&canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: Address, b: Address) -> Option<&mut Link> {
        self.links.get_mut(&canonical_pair(a, b))
    }

    /// True if a link exists and is active.
    pub fn is_connected(&self, a: Address, b: Address) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes currently in range of `node`, in address order.
    pub fn neighbors(&self, node: Address) -> Vec<Address> {
        let mut result: Vec<Address> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        result.sort();
        result
    }

    /// Disable all links crossing between groups.
    ///
    /// Nodes named in no group form one implicit group of their own.
    pub fn partition(&mut self, groups: &[Vec<Address>]) {
        for (&(a, b), link) in self.links.iter_mut() {
            let a_group = groups.iter().position(|g| g.contains(&a));
            let b_group = groups.iter().position(|g| g.contains(&b));
            if a_group != b_group {
                link.active = false;
            }
        }
    }

    /// Re-enable every link.
    pub fn heal(&mut self) {
        for link in self.links.values_mut() {
            link.active = true;
        }
    }

    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    pub fn set_global_delay(&mut self, delay: Duration) {
        for link in self.links.values_mut() {
            link.delay = delay;
        }
    }

    /// Number of links, active or not.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

/// Links are stored under the lower address first.
fn canonical_pair(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
