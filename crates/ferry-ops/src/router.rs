//! Picks the handler that runs an operation.
//!
//! Routing is an ordered table of rules over the set of backends an operation
//! touches. The first rule that matches decides.

use ferry_core::{Backend, ClassifierCache, Operation, OperationKind};
use indexmap::IndexSet;
use tracing::debug;

/// What the routing rules look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInput {
    /// Backends present, in first-detection order.
    pub detected: IndexSet<Backend>,
    pub kind: OperationKind,
    /// Backend of the destination, for copy and move.
    pub destination: Option<Backend>,
}

impl RouteInput {
    fn has(&self, backend: Backend) -> bool {
        self.detected.contains(&backend)
    }

    /// The earliest detected of `candidates`.
    fn first_of(&self, candidates: &[Backend]) -> Option<Backend> {
        self.detected
            .iter()
            .copied()
            .find(|backend| candidates.contains(backend))
    }
}

/// One row of the routing table.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub name: &'static str,
    pub select: fn(&RouteInput) -> Option<Backend>,
}

/// Routing rules in priority order.
pub const ROUTES: &[Route] = &[
    Route {
        name: "cloud",
        select: route_cloud,
    },
    Route {
        name: "smb+sftp",
        select: route_smb_sftp,
    },
    Route {
        name: "smb+ftp",
        select: route_smb_ftp,
    },
    Route {
        name: "sftp+ftp",
        select: route_sftp_ftp,
    },
    Route {
        name: "single-network",
        select: route_single_network,
    },
    Route {
        name: "local",
        select: route_local,
    },
];

fn route_cloud(input: &RouteInput) -> Option<Backend> {
    input.has(Backend::Cloud).then_some(Backend::Cloud)
}

fn route_smb_sftp(input: &RouteInput) -> Option<Backend> {
    if !(input.has(Backend::Smb) && input.has(Backend::Sftp)) {
        return None;
    }
    let pair = [Backend::Smb, Backend::Sftp];
    match (input.kind, input.destination) {
        (OperationKind::Copy | OperationKind::Move, Some(dest)) if pair.contains(&dest) => {
            Some(dest)
        }
        _ => input.first_of(&pair),
    }
}

fn route_smb_ftp(input: &RouteInput) -> Option<Backend> {
    (input.has(Backend::Smb) && input.has(Backend::Ftp)).then_some(Backend::Smb)
}

fn route_sftp_ftp(input: &RouteInput) -> Option<Backend> {
    (input.has(Backend::Sftp) && input.has(Backend::Ftp)).then_some(Backend::Sftp)
}

fn route_single_network(input: &RouteInput) -> Option<Backend> {
    let mut network = input.detected.iter().filter(|backend| backend.is_network());
    match (network.next(), network.next()) {
        (Some(only), None) => Some(*only),
        _ => None,
    }
}

fn route_local(_: &RouteInput) -> Option<Backend> {
    Some(Backend::Local)
}

/// The routing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    /// Handler that runs the operation. `Local` covers scoped storage too.
    pub handler: Backend,
    /// Name of the rule that matched.
    pub rule: &'static str,
}

/// Classifies an operation's locators and applies [`ROUTES`].
#[derive(Debug, Default)]
pub struct Router {
    cache: ClassifierCache,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the routing inputs for `operation`.
    pub fn inspect(&self, operation: &Operation) -> RouteInput {
        let detected = operation
            .locators()
            .into_iter()
            .map(|locator| self.cache.classify(locator.as_str()))
            .collect();
        RouteInput {
            detected,
            kind: operation.kind(),
            destination: operation
                .destination()
                .map(|locator| self.cache.classify(locator.as_str())),
        }
    }

    pub fn route(&self, operation: &Operation) -> RouteDecision {
        let input = self.inspect(operation);
        let decision = decide(&input);
        debug!(
            kind = %input.kind,
            backends = ?input.detected,
            handler = %decision.handler,
            rule = decision.rule,
            "routed operation"
        );
        decision
    }
}

/// Apply the routing table to prepared inputs.
pub fn decide(input: &RouteInput) -> RouteDecision {
    ROUTES
        .iter()
        .find_map(|route| {
            (route.select)(input).map(|handler| RouteDecision {
                handler,
                rule: route.name,
            })
        })
        .unwrap_or(RouteDecision {
            handler: Backend::Local,
            rule: "local",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::Locator;

    fn route(op: Operation) -> Backend {
        Router::new().route(&op).handler
    }

    fn locators(raw: &[&str]) -> Vec<Locator> {
        raw.iter().map(|r| Locator::new(*r)).collect()
    }

    #[test]
    fn test_local_only() {
        let op = Operation::copy(locators(&["/a", "/b"]), "/dst", false);
        assert_eq!(route(op), Backend::Local);
    }

    #[test]
    fn test_scoped_runs_locally() {
        let op = Operation::copy(locators(&["content://tree/a"]), "/dst", false);
        assert_eq!(route(op), Backend::Local);
    }

    #[test]
    fn test_cloud_wins() {
        let op = Operation::copy(locators(&["smb://nas/a"]), "gdrive://x/dst", false);
        assert_eq!(route(op), Backend::Cloud);
    }

    #[test]
    fn test_smb_sftp_prefers_destination() {
        let op = Operation::copy(locators(&["smb://nas/a"]), "sftp://host/dst", false);
        assert_eq!(route(op), Backend::Sftp);

        let op = Operation::move_to(locators(&["sftp://host/a"]), "smb://nas/dst", false);
        assert_eq!(route(op), Backend::Smb);
    }

    #[test]
    fn test_smb_sftp_local_destination_uses_first_detected() {
        let op = Operation::copy(
            locators(&["sftp://host/a", "smb://nas/b"]),
            "/storage/dst",
            false,
        );
        assert_eq!(route(op), Backend::Sftp);
    }

    #[test]
    fn test_smb_sftp_delete_uses_first_detected() {
        let op = Operation::delete(locators(&["smb://nas/a", "sftp://host/b"]), false);
        assert_eq!(route(op), Backend::Smb);
    }

    #[test]
    fn test_ftp_pairs() {
        let op = Operation::copy(locators(&["ftp://host/a"]), "smb://nas/dst", false);
        assert_eq!(route(op), Backend::Smb);

        let op = Operation::copy(locators(&["ftp://host/a"]), "sftp://host/dst", false);
        assert_eq!(route(op), Backend::Sftp);
    }

    #[test]
    fn test_single_network() {
        let op = Operation::copy(locators(&["/a"]), "ftp://host/dst", false);
        assert_eq!(route(op), Backend::Ftp);

        let op = Operation::rename("smb://nas/share/a.jpg", "b.jpg");
        assert_eq!(route(op), Backend::Smb);
    }

    #[test]
    fn test_table_order() {
        let names: Vec<&str> = ROUTES.iter().map(|r| r.name).collect();
        assert_eq!(names.first(), Some(&"cloud"));
        assert_eq!(names.last(), Some(&"local"));
    }

    #[test]
    fn test_decide_on_prepared_input() {
        let input = RouteInput {
            detected: [Backend::Local, Backend::Smb, Backend::Sftp].into_iter().collect(),
            kind: OperationKind::Delete,
            destination: None,
        };
        let decision = decide(&input);
        assert_eq!(decision.handler, Backend::Smb);
        assert_eq!(decision.rule, "smb+sftp");
    }
}
