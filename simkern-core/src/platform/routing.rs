//! Host-to-host route table computed from the zone tree.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use super::{Link, NetPoint, NetZone, PlatformError, RouteSpec, RoutingKind};
use crate::registry::Registry;

type Route = Vec<Arc<Link>>;

/// Routes between every connected pair of hosts.
#[derive(Debug, Default)]
pub(crate) struct RoutingTable {
    routes: HashMap<(String, String), Route>,
}

impl RoutingTable {
    /// Walks the zone tree and installs the routes of every zone.
    pub fn build(
        root: &NetZone,
        links: &Registry<Link>,
        points: &Registry<NetPoint>,
    ) -> Result<Self, PlatformError> {
        let mut table = Self::default();
        table.add_zone(root, links, points)?;
        Ok(table)
    }

    pub fn get(&self, src: &str, dst: &str) -> Option<&Route> {
        self.routes.get(&(src.to_string(), dst.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    fn add_zone(
        &mut self,
        zone: &NetZone,
        links: &Registry<Link>,
        points: &Registry<NetPoint>,
    ) -> Result<(), PlatformError> {
        match zone.routing() {
            RoutingKind::Full | RoutingKind::Empty => {
                for spec in zone.routes() {
                    self.add_declared(zone, spec, links, points)?;
                }
            }
            RoutingKind::Cluster => {
                self.add_cluster(zone, links)?;
                for spec in zone.routes() {
                    self.add_declared(zone, spec, links, points)?;
                }
            }
            RoutingKind::Dijkstra => self.add_shortest_paths(zone, links, points)?,
        }

        for child in zone.children() {
            self.add_zone(child, links, points)?;
        }
        Ok(())
    }

    fn insert(&mut self, src: &str, dst: &str, route: Route) -> Result<(), PlatformError> {
        let key = (src.to_string(), dst.to_string());
        if self.routes.contains_key(&key) {
            return Err(PlatformError::DuplicateRoute {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        self.routes.insert(key, route);
        Ok(())
    }

    fn add_declared(
        &mut self,
        zone: &NetZone,
        spec: &RouteSpec,
        links: &Registry<Link>,
        points: &Registry<NetPoint>,
    ) -> Result<(), PlatformError> {
        let route = resolve(zone, spec, links, points)?;
        if spec.symmetric {
            let mut reverse = route.clone();
            reverse.reverse();
            self.insert(&spec.dst, &spec.src, reverse)?;
        }
        self.insert(&spec.src, &spec.dst, route)
    }

    fn add_cluster(&mut self, zone: &NetZone, links: &Registry<Link>) -> Result<(), PlatformError> {
        let lookup = |name: String| {
            links
                .by_name_or_null(&name)
                .ok_or_else(|| PlatformError::UnknownLink {
                    zone: zone.name().to_string(),
                    name,
                })
        };

        let backbone = match zone.cluster_spec().and_then(|spec| spec.backbone) {
            Some(_) => Some(lookup(zone.backbone_name())?),
            None => None,
        };

        for src in zone.hosts() {
            for dst in zone.hosts() {
                if src.name() == dst.name() {
                    continue;
                }
                let mut route = vec![lookup(zone.private_link_name(src.name()))?];
                route.extend(backbone.iter().cloned());
                route.push(lookup(zone.private_link_name(dst.name()))?);
                self.insert(src.name(), dst.name(), route)?;
            }
        }
        Ok(())
    }

    fn add_shortest_paths(
        &mut self,
        zone: &NetZone,
        links: &Registry<Link>,
        points: &Registry<NetPoint>,
    ) -> Result<(), PlatformError> {
        let mut graph: HashMap<&str, Vec<Edge>> = HashMap::new();
        for spec in zone.routes() {
            let route = resolve(zone, spec, links, points)?;
            let latency = route.iter().map(|link| link.latency()).sum();
            if spec.symmetric {
                let mut reverse = route.clone();
                reverse.reverse();
                graph.entry(spec.dst.as_str()).or_default().push(Edge {
                    to: spec.src.as_str(),
                    latency,
                    route: reverse,
                });
            }
            graph.entry(spec.src.as_str()).or_default().push(Edge {
                to: spec.dst.as_str(),
                latency,
                route,
            });
        }

        for src in zone.hosts() {
            let paths = shortest_paths(&graph, src.name());
            for dst in zone.hosts() {
                if dst.name() == src.name() {
                    continue;
                }
                if let Some(route) = paths.get(dst.name()) {
                    self.insert(src.name(), dst.name(), route.clone())?;
                }
            }
        }
        Ok(())
    }
}

fn resolve(
    zone: &NetZone,
    spec: &RouteSpec,
    links: &Registry<Link>,
    points: &Registry<NetPoint>,
) -> Result<Route, PlatformError> {
    for point in [&spec.src, &spec.dst] {
        if !points.contains(point) {
            return Err(PlatformError::UnknownPoint {
                zone: zone.name().to_string(),
                name: point.clone(),
            });
        }
    }

    spec.links
        .iter()
        .map(|name| {
            links
                .by_name_or_null(name)
                .ok_or_else(|| PlatformError::UnknownLink {
                    zone: zone.name().to_string(),
                    name: name.clone(),
                })
        })
        .collect()
}

#[derive(Debug)]
struct Edge<'a> {
    to: &'a str,
    latency: f64,
    route: Route,
}

/// Frontier entry, ordered so that `BinaryHeap` pops the lowest latency,
/// then the fewest hops, then the smallest name.
#[derive(Debug, PartialEq)]
struct Frontier<'a> {
    latency: f64,
    hops: usize,
    node: &'a str,
}

impl Eq for Frontier<'_> {}

impl Ord for Frontier<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.latency
            .total_cmp(&other.latency)
            .then(self.hops.cmp(&other.hops))
            .then(self.node.cmp(other.node))
            .reverse()
    }
}

impl PartialOrd for Frontier<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn shortest_paths<'a>(graph: &HashMap<&'a str, Vec<Edge<'a>>>, source: &'a str) -> HashMap<&'a str, Route> {
    let mut best: HashMap<&str, (f64, usize)> = HashMap::new();
    let mut paths: HashMap<&str, Route> = HashMap::new();
    let mut frontier = BinaryHeap::new();

    best.insert(source, (0.0, 0));
    paths.insert(source, Vec::new());
    frontier.push(Frontier {
        latency: 0.0,
        hops: 0,
        node: source,
    });

    while let Some(Frontier { latency, hops, node }) = frontier.pop() {
        if best.get(node).is_some_and(|&known| known < (latency, hops)) {
            continue;
        }
        let Some(edges) = graph.get(node) else {
            continue;
        };
        let here = paths.get(node).cloned().unwrap_or_default();

        for edge in edges {
            let candidate = (latency + edge.latency, hops + 1);
            let improves = best.get(edge.to).is_none_or(|&known| candidate < known);
            if improves {
                best.insert(edge.to, candidate);
                let mut route = here.clone();
                route.extend(edge.route.iter().cloned());
                paths.insert(edge.to, route);
                frontier.push(Frontier {
                    latency: candidate.0,
                    hops: candidate.1,
                    node: edge.to,
                });
            }
        }
    }

    paths.remove(source);
    paths
}

#[cfg(test)]
mod tests {
    use super::super::{ClusterSpec, Host, PlatformState};
    use super::*;

    fn names(route: &Route) -> Vec<&str> {
        route.iter().map(|link| link.name()).collect()
    }

    #[test]
    fn test_dijkstra_prefers_low_latency_path() {
        let mut zone = NetZone::new("mesh", RoutingKind::Dijkstra);
        zone.add_host(Host::new("a", 1e9))
            .add_host(Host::new("b", 1e9))
            .add_router("r")
            .add_link(Link::new("slow", 1e9, 1.0))
            .add_link(Link::new("ar", 1e8, 1e-3))
            .add_link(Link::new("rb", 1e8, 1e-3))
            .add_route("a", "b", &["slow"], true)
            .add_route("a", "r", &["ar"], true)
            .add_route("r", "b", &["rb"], true);

        let state = PlatformState::realize(zone).unwrap();
        assert_eq!(names(state.routing.get("a", "b").unwrap()), vec!["ar", "rb"]);
        assert_eq!(names(state.routing.get("b", "a").unwrap()), vec!["rb", "ar"]);
    }

    #[test]
    fn test_dijkstra_leaves_disconnected_hosts_unrouted() {
        let mut zone = NetZone::new("islands", RoutingKind::Dijkstra);
        zone.add_host(Host::new("a", 1e9)).add_host(Host::new("b", 1e9));

        let state = PlatformState::realize(zone).unwrap();
        assert!(matches!(
            state.route("a", "b"),
            Err(PlatformError::NoRoute { .. })
        ));
    }

    #[test]
    fn test_cluster_routes_through_backbone() {
        let spec = ClusterSpec {
            link_bandwidth: 1.25e8,
            link_latency: 5e-5,
            backbone: Some((1.25e9, 1e-4)),
        };
        let state = PlatformState::realize(NetZone::cluster("c", "n", 3, 1e9, spec)).unwrap();

        assert_eq!(
            names(state.routing.get("n0", "n2").unwrap()),
            vec!["c_link_n0", "c_backbone", "c_link_n2"]
        );
        assert_eq!(state.routing.len(), 6);
    }

    #[test]
    fn test_route_to_unknown_link_fails() {
        let mut zone = NetZone::new("world", RoutingKind::Full);
        zone.add_host(Host::new("a", 1e9))
            .add_host(Host::new("b", 1e9))
            .add_route("a", "b", &["missing"], false);

        assert_eq!(
            PlatformState::realize(zone).unwrap_err(),
            PlatformError::UnknownLink {
                zone: "world".to_string(),
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_route_fails() {
        let mut zone = NetZone::new("world", RoutingKind::Full);
        zone.add_host(Host::new("a", 1e9))
            .add_host(Host::new("b", 1e9))
            .add_link(Link::new("l", 1e8, 0.0))
            .add_route("a", "b", &["l"], true)
            .add_route("b", "a", &["l"], false);

        assert!(matches!(
            PlatformState::realize(zone),
            Err(PlatformError::DuplicateRoute { .. })
        ));
    }

    #[test]
    fn test_parent_zone_routes_between_children() {
        let mut left = NetZone::new("left", RoutingKind::Full);
        left.add_host(Host::new("a", 1e9));
        let mut right = NetZone::new("right", RoutingKind::Full);
        right.add_host(Host::new("b", 1e9));

        let mut root = NetZone::new("root", RoutingKind::Full);
        root.add_child(left)
            .add_child(right)
            .add_link(Link::new("wan", 1e7, 1e-2))
            .add_route("a", "b", &["wan"], true);

        let state = PlatformState::realize(root).unwrap();
        assert_eq!(names(&state.route("b", "a").unwrap()), vec!["wan"]);
    }
}
