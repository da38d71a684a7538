//! Topology tree description handed to the engine.
//!
//! A [`NetZone`] is plain data: it is assembled by whatever loader reads the
//! platform description and becomes immutable once the engine realizes it.

use std::sync::Arc;

use super::{Disk, Host, Link, Storage};

/// How a zone computes routes between its own points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKind {
    /// Every route is declared explicitly
    Full,
    /// Declared routes are edges; host-to-host routes are the lowest-latency paths
    Dijkstra,
    /// Each host hangs off a private link, optionally joined by a backbone
    Cluster,
    /// Container for sub-zones, with no routing of its own
    Empty,
}

impl RoutingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingKind::Full => "Full",
            RoutingKind::Dijkstra => "Dijkstra",
            RoutingKind::Cluster => "Cluster",
            RoutingKind::Empty => "Empty",
        }
    }
}

/// Declared route between two points of a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    pub src: String,
    pub dst: String,
    pub links: Vec<String>,
    /// Also install the reverse route, with the link list reversed
    pub symmetric: bool,
}

/// Private and backbone link characteristics of a cluster zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSpec {
    pub link_bandwidth: f64,
    pub link_latency: f64,
    /// `(bandwidth, latency)` of the shared backbone
    pub backbone: Option<(f64, f64)>,
}

/// A network region: its own resources, routes and sub-zones.
#[derive(Debug, Clone)]
pub struct NetZone {
    name: String,
    routing: RoutingKind,
    hosts: Vec<Host>,
    links: Vec<Link>,
    disks: Vec<Disk>,
    storages: Vec<Storage>,
    routers: Vec<String>,
    routes: Vec<RouteSpec>,
    cluster: Option<ClusterSpec>,
    children: Vec<Arc<NetZone>>,
}

impl NetZone {
    pub fn new(name: impl Into<String>, routing: RoutingKind) -> Self {
        Self {
            name: name.into(),
            routing,
            hosts: Vec::new(),
            links: Vec::new(),
            disks: Vec::new(),
            storages: Vec::new(),
            routers: Vec::new(),
            routes: Vec::new(),
            cluster: None,
            children: Vec::new(),
        }
    }

    /// Builds a cluster of `count` identical hosts named `{prefix}{i}`.
    ///
    /// Host `h` gets a private link `{name}_link_{h}`; the backbone, when
    /// present, is `{name}_backbone`.
    pub fn cluster(
        name: impl Into<String>,
        prefix: &str,
        count: usize,
        speed: f64,
        spec: ClusterSpec,
    ) -> Self {
        let mut zone = Self::new(name, RoutingKind::Cluster);
        for index in 0..count {
            let host = format!("{prefix}{index}");
            let link = zone.private_link_name(&host);
            zone.links
                .push(Link::new(link, spec.link_bandwidth, spec.link_latency));
            zone.hosts.push(Host::new(host, speed));
        }
        if let Some((bandwidth, latency)) = spec.backbone {
            let backbone = zone.backbone_name();
            zone.links.push(Link::new(backbone, bandwidth, latency));
        }
        zone.cluster = Some(spec);
        zone
    }

    pub fn add_host(&mut self, host: Host) -> &mut Self {
        self.hosts.push(host);
        self
    }

    pub fn add_link(&mut self, link: Link) -> &mut Self {
        self.links.push(link);
        self
    }

    pub fn add_disk(&mut self, disk: Disk) -> &mut Self {
        self.disks.push(disk);
        self
    }

    pub fn add_storage(&mut self, storage: Storage) -> &mut Self {
        self.storages.push(storage);
        self
    }

    pub fn add_router(&mut self, name: impl Into<String>) -> &mut Self {
        self.routers.push(name.into());
        self
    }

    /// Declares a route made of the named links, in traversal order.
    pub fn add_route(&mut self, src: &str, dst: &str, links: &[&str], symmetric: bool) -> &mut Self {
        self.routes.push(RouteSpec {
            src: src.to_string(),
            dst: dst.to_string(),
            links: links.iter().map(|link| link.to_string()).collect(),
            symmetric,
        });
        self
    }

    /// Nests `child`, which must be fully built beforehand.
    pub fn add_child(&mut self, child: NetZone) -> &mut Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn routing(&self) -> RoutingKind {
        self.routing
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    pub fn routers(&self) -> &[String] {
        &self.routers
    }

    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }

    pub fn cluster_spec(&self) -> Option<&ClusterSpec> {
        self.cluster.as_ref()
    }

    pub fn children(&self) -> &[Arc<NetZone>] {
        &self.children
    }

    pub(crate) fn private_link_name(&self, host: &str) -> String {
        format!("{}_link_{}", self.name, host)
    }

    pub(crate) fn backbone_name(&self) -> String {
        format!("{}_backbone", self.name)
    }

    /// Collects sub-zones matching `predicate`, depth first.
    ///
    /// A zone's children are reported before the zone itself; `self` is not
    /// part of the result.
    pub fn filtered_children<F>(&self, predicate: &F) -> Vec<Arc<NetZone>>
    where
        F: Fn(&NetZone) -> bool,
    {
        let mut found = Vec::new();
        for child in &self.children {
            found.extend(child.filtered_children(predicate));
            if predicate(child.as_ref()) {
                found.push(Arc::clone(child));
            }
        }
        found
    }

    /// Finds a zone of this subtree, `self` included, by name.
    pub fn find(self: &Arc<Self>, name: &str) -> Option<Arc<NetZone>> {
        if self.name == name {
            return Some(Arc::clone(self));
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> NetZone {
        let mut left = NetZone::new("left", RoutingKind::Full);
        left.add_child(NetZone::new("left-leaf", RoutingKind::Cluster));

        let mut root = NetZone::new("root", RoutingKind::Full);
        root.add_child(left)
            .add_child(NetZone::new("right", RoutingKind::Dijkstra));
        root
    }

    #[test]
    fn test_filtered_children_visits_leaves_first() {
        let root = tree();
        let names: Vec<String> = root
            .filtered_children(&|_: &NetZone| true)
            .iter()
            .map(|zone| zone.name().to_string())
            .collect();
        assert_eq!(names, vec!["left-leaf", "left", "right"]);
    }

    #[test]
    fn test_filtered_children_by_routing() {
        let root = tree();
        let full = root.filtered_children(&|zone: &NetZone| zone.routing() == RoutingKind::Full);
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].name(), "left");
    }

    #[test]
    fn test_find_by_name() {
        let root = Arc::new(tree());
        assert!(root.find("root").is_some());
        assert_eq!(root.find("left-leaf").unwrap().routing(), RoutingKind::Cluster);
        assert!(root.find("nowhere").is_none());
    }

    #[test]
    fn test_cluster_generates_private_links() {
        let spec = ClusterSpec {
            link_bandwidth: 1.25e8,
            link_latency: 5e-5,
            backbone: Some((1.25e9, 1e-4)),
        };
        let zone = NetZone::cluster("c", "node-", 3, 1e9, spec);

        assert_eq!(zone.hosts().len(), 3);
        assert_eq!(zone.hosts()[2].name(), "node-2");
        let links: Vec<&str> = zone.links().iter().map(|link| link.name()).collect();
        assert_eq!(
            links,
            vec!["c_link_node-0", "c_link_node-1", "c_link_node-2", "c_backbone"]
        );
    }
}
