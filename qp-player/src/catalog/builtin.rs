//! Compiled-in demo scripts
//!
//! - `connection`: two hosts allocate resources, create QPs, exchange QP info
//!   out of band and walk both QPs RESET → INIT → RTR → RTS
//! - `qp-creation`: resource and QP setup on a single host
//! - `data-plane`: one-sided RDMA WRITE from posting the WR to completion

use super::{
    Action, Catalog, ConnectionStyle, HostId, QpState, ResourceKind, Step, Target,
};
use crate::error::{CatalogError, CatalogResult};

const SCENARIOS: &[&str] = &["connection", "qp-creation", "data-plane"];

/// Ids of all built-in scenarios, in menu order
pub fn builtin_ids() -> &'static [&'static str] {
    SCENARIOS
}

/// Look up a built-in scenario by id
pub fn builtin(id: &str) -> CatalogResult<Catalog> {
    match id {
        "connection" => Ok(connection()),
        "qp-creation" => Ok(qp_creation()),
        "data-plane" => Ok(data_plane()),
        _ => Err(CatalogError::UnknownScenario {
            id: id.to_string(),
            available: SCENARIOS.join(", "),
        }),
    }
}

fn code(code: &str, location: &str) -> Action {
    Action::ShowCode {
        code: code.to_string(),
        location: Some(location.to_string()),
    }
}

fn params(items: &[&str]) -> Action {
    Action::ShowParameters {
        params: items.iter().map(|s| s.to_string()).collect(),
    }
}

fn info(text: &str) -> Action {
    Action::ShowInfo {
        text: text.to_string(),
    }
}

fn success(text: &str) -> Action {
    Action::ShowSuccess {
        text: text.to_string(),
    }
}

fn create(resource: ResourceKind) -> Action {
    Action::CreateResource { resource }
}

fn modify(from: QpState, to: QpState) -> Action {
    Action::ModifyQueuePair { from, to }
}

fn exchange(from_host: HostId, payload: &str, label: &str) -> Action {
    Action::DataExchange {
        from_host,
        to_host: from_host.peer(),
        payload: payload.to_string(),
        label: Some(label.to_string()),
    }
}

fn connect(style: ConnectionStyle, color: &str) -> Action {
    Action::ShowConnection {
        style,
        color: Some(color.to_string()),
    }
}

/// Device open + PD/CQ/MR for one host
fn resource_steps(host: HostId, first_id: usize) -> Vec<Step> {
    let target = Target::from(host);
    let id = |n: usize| format!("step-{}", first_id + n);

    vec![
        Step::new(
            id(0),
            1,
            format!("Open RDMA device ({})", host),
            "ibv_open_device() opens the RNIC and returns the device context every later \
             allocation hangs off.",
            3000,
        )
        .with_action(target, Action::Highlight { element: "rnic".to_string() })
        .with_action(Target::Panel, code("ibv_context *ctx = ibv_open_device(device);", "src/rdma_common.c:53"))
        .with_action(Target::Panel, info(&format!("{} obtains its device context", host))),
        Step::new(
            id(1),
            1,
            format!("Allocate protection domain (PD) - {}", host),
            "ibv_alloc_pd() allocates the Protection Domain. MRs, CQs and QPs all belong to a PD.",
            3000,
        )
        .with_action(target, create(ResourceKind::Pd))
        .with_action(Target::Panel, code("ibv_pd *pd = ibv_alloc_pd(ctx);", "src/rdma_common.c:82"))
        .with_action(Target::Panel, params(&["ctx: device context", "returns: PD handle"])),
        Step::new(
            id(2),
            1,
            format!("Create completion queue (CQ) - {}", host),
            "ibv_create_cq() creates the Completion Queue. The application polls it to learn \
             when work requests finish.",
            3000,
        )
        .with_action(target, create(ResourceKind::Cq))
        .with_action(Target::Panel, code("ibv_cq *cq = ibv_create_cq(ctx, cq_size, NULL, NULL, 0);", "src/rdma_common.c:115"))
        .with_action(Target::Panel, params(&["ctx: device context", "cq_size: number of CQ entries", "returns: CQ handle"])),
        Step::new(
            id(3),
            1,
            format!("Register memory region (MR) - {}", host),
            "ibv_reg_mr() pins and registers a buffer so the RNIC can read and write it directly, \
             including on behalf of the remote peer.",
            3000,
        )
        .with_action(target, create(ResourceKind::Mr))
        .with_action(Target::Panel, code("ibv_mr *mr = ibv_reg_mr(pd, buf, length, access);", "src/rdma_common.c:100"))
        .with_action(Target::Panel, params(&["pd: protection domain", "buf: buffer pointer", "length: buffer length", "access: access flags"])),
    ]
}

fn transition_step(
    id: &str,
    host: HostId,
    from: QpState,
    to: QpState,
    description: &str,
    snippet: (&str, &str),
    duration_ms: u64,
) -> Step {
    Step::new(id, 3, format!("{}: {} → {}", host, from, to), description, duration_ms)
        .with_action(Target::from(host), modify(from, to))
        .with_action(Target::Panel, code(snippet.0, snippet.1))
        .with_state_change(host, from, to)
}

fn connection() -> Catalog {
    let mut steps = resource_steps(HostId::A, 1);
    steps.extend(resource_steps(HostId::B, 5));

    steps.push(
        Step::new(
            "step-9",
            2,
            "Host A creates QP",
            "ibv_create_qp() creates the Queue Pair. A new QP starts in RESET and must be \
             transitioned before it can communicate.",
            3000,
        )
        .with_action(Target::HostA, Action::CreateQueuePair)
        .with_action(Target::HostA, modify(QpState::Uninitialized, QpState::Reset))
        .with_action(Target::Panel, code("ibv_qp *qp = ibv_create_qp(pd, &qp_attr);", "src/rdma_common_qp.c:28"))
        .with_action(Target::Panel, params(&["pd: protection domain", "qp_attr: QP attributes", "initial state: RESET"]))
        .with_state_change(HostId::A, QpState::Uninitialized, QpState::Reset),
    );
    steps.push(
        Step::new(
            "step-10",
            2,
            "Host B creates QP",
            "Host B calls ibv_create_qp() as well. Both sides need a QP before a connection \
             can be established.",
            3000,
        )
        .with_action(Target::HostB, Action::CreateQueuePair)
        .with_action(Target::HostB, modify(QpState::Uninitialized, QpState::Reset))
        .with_action(Target::Panel, code("ibv_qp *qp = ibv_create_qp(pd, &qp_attr);", "src/rdma_common_qp.c:28"))
        .with_action(Target::Panel, info("Host B's QP is created in RESET"))
        .with_state_change(HostId::B, QpState::Uninitialized, QpState::Reset),
    );
    steps.push(
        Step::new(
            "step-11",
            2,
            "Exchange QP info",
            "QP numbers, GIDs and LIDs are swapped over an out-of-band channel. The remote side \
             needs them to address the QP during RTR.",
            4000,
        )
        .with_action(Target::Network, exchange(HostId::A, "QP-INFO", "QPN_A, GID_A"))
        .with_action(Target::Network, exchange(HostId::B, "QP-INFO", "QPN_B, GID_B"))
        .with_action(
            Target::Panel,
            code(
                "// swap qp_info_t over the TCP socket\ntcp_send(&local_qpn, &local_gid, &local_lid);",
                "src/rdma_common_net.c",
            ),
        )
        .with_action(Target::Panel, info("QP info flows in both directions"))
        .with_action(Target::Network, connect(ConnectionStyle::Dashed, "#F59E0B")),
    );

    steps.push(
        transition_step(
            "step-12",
            HostId::A,
            QpState::Reset,
            QpState::Init,
            "ibv_modify_qp() moves Host A's QP to INIT. Port number and access flags are set here.",
            ("ibv_modify_qp(qp, &attr, IBV_QP_STATE | IBV_QP_PORT);", "src/rdma_common_qp.c:86"),
            3000,
        )
        .with_action(Target::Panel, params(&["qp_state: INIT", "port_num: 1", "access_flags: local access"])),
    );
    steps.push(
        transition_step(
            "step-13",
            HostId::B,
            QpState::Reset,
            QpState::Init,
            "Host B moves its QP to INIT the same way.",
            ("ibv_modify_qp(qp, &attr, IBV_QP_STATE | IBV_QP_PORT);", "src/rdma_common_qp.c:86"),
            3000,
        )
        .with_action(Target::Panel, info("Host B's QP is now in INIT")),
    );
    steps.push(
        transition_step(
            "step-14",
            HostId::A,
            QpState::Init,
            QpState::Rtr,
            "ibv_modify_qp() moves Host A's QP to RTR (Ready to Receive). The remote QP number \
             and address handle attributes are configured here.",
            ("ibv_modify_qp(qp, &attr, IBV_QP_STATE | IBV_QP_AV | ...);", "src/rdma_common_qp.c:157"),
            3500,
        )
        .with_action(
            Target::Panel,
            params(&["qp_state: RTR", "remote_qpn: peer QPN", "remote_gid: peer GID", "ah_attr: address handle"]),
        ),
    );
    steps.push(
        transition_step(
            "step-15",
            HostId::B,
            QpState::Init,
            QpState::Rtr,
            "Host B moves its QP to RTR. With both sides in RTR, RDMA traffic can be received.",
            ("ibv_modify_qp(qp, &attr, IBV_QP_STATE | IBV_QP_AV | ...);", "src/rdma_common_qp.c:157"),
            3500,
        )
        .with_action(Target::Panel, info("Both QPs are in RTR and can receive")),
    );
    steps.push(
        transition_step(
            "step-16",
            HostId::A,
            QpState::Rtr,
            QpState::Rts,
            "ibv_modify_qp() moves Host A's QP to RTS (Ready to Send). Timeout and retry counts \
             are set here.",
            ("ibv_modify_qp(qp, &attr, IBV_QP_STATE | IBV_QP_TIMEOUT | ...);", "src/rdma_common_qp.c:241"),
            3000,
        )
        .with_action(
            Target::Panel,
            params(&["qp_state: RTS", "timeout: ack timeout", "retry_cnt: retry count", "rnr_retry: RNR retries"]),
        ),
    );
    steps.push(
        transition_step(
            "step-17",
            HostId::B,
            QpState::Rtr,
            QpState::Rts,
            "Host B moves its QP to RTS. Both QPs are ready for bidirectional RDMA traffic.",
            ("ibv_modify_qp(qp, &attr, IBV_QP_STATE | IBV_QP_TIMEOUT | ...);", "src/rdma_common_qp.c:241"),
            3500,
        )
        .with_action(Target::Panel, success("QP connection established!")),
    );

    steps.push(
        Step::new(
            "step-18",
            4,
            "Connection established",
            "Both QPs are in RTS and the RDMA connection is up. RDMA Read/Write/Send can now move \
             data without involving the remote CPU.",
            5000,
        )
        .with_action(Target::Network, connect(ConnectionStyle::Solid, "#10B981"))
        .with_action(Target::Network, exchange(HostId::A, "RDMA WRITE", "DATA"))
        .with_action(
            Target::Panel,
            code("// RDMA data transfer can begin\nibv_post_send(qp, &wr, &bad_wr);", "src/rdma_common_net.c:190"),
        )
        .with_action(Target::Panel, success("RDMA connection ready for data transfer!")),
    );

    Catalog::new("connection", "QP connection establishment", steps)
        .with_description("Two hosts set up resources, exchange QP info and bring both QPs to RTS")
        .with_phases(&[
            (1, "Resource setup"),
            (2, "QP creation"),
            (3, "State transitions"),
            (4, "Connected"),
        ])
}

fn qp_creation() -> Catalog {
    let a = Target::HostA;
    let steps = vec![
        Step::new("qp-1-pd", 1, "Allocate protection domain (PD)", "Allocate the PD that scopes access to RDMA resources", 800)
            .with_action(a, create(ResourceKind::Pd))
            .with_action(Target::Panel, code("pd = ibv_alloc_pd(ib_ctx);", "src/rdma_common.c:82")),
        Step::new("qp-2-cq", 1, "Create completion queue (CQ)", "Create the CQ that receives work completions", 800)
            .with_action(a, create(ResourceKind::Cq))
            .with_action(Target::Panel, code("cq = ibv_create_cq(ib_ctx, cq_size, NULL, NULL, 0);", "src/rdma_common.c:115")),
        Step::new("qp-3-mr", 1, "Register memory (MR)", "Register application memory so the hardware can access it directly", 800)
            .with_action(a, create(ResourceKind::Mr))
            .with_action(Target::Panel, code("mr = ibv_reg_mr(pd, buf_ptr, buf_size, ...);", "src/rdma_common.c:100")),
        Step::new("qp-4-create", 2, "Create QP", "Create the Queue Pair used for point-to-point RDMA", 1000)
            .with_action(a, Action::CreateQueuePair)
            .with_action(Target::Panel, code("qp = ibv_create_qp(pd, &qp_init_attr);", "src/rdma_common.c:140"))
            .with_state_change(HostId::A, QpState::Uninitialized, QpState::Reset),
        Step::new("qp-5-init", 3, "QP transition: RESET → INIT", "Move the QP from reset to initialised", 1000)
            .with_action(a, modify(QpState::Reset, QpState::Init))
            .with_action(Target::Panel, code("ibv_modify_qp(qp, &attr, IBV_QP_STATE);", "src/rdma_common.c:168"))
            .with_state_change(HostId::A, QpState::Reset, QpState::Init),
        Step::new("qp-6-rtr", 3, "QP transition: INIT → RTR", "Move the QP to Ready to Receive", 1200)
            .with_action(a, modify(QpState::Init, QpState::Rtr))
            .with_action(Target::Panel, code("modify_qp_to_rtr(...); // RTR requires GID info", "src/rdma_common.c:213"))
            .with_state_change(HostId::A, QpState::Init, QpState::Rtr),
        Step::new("qp-7-rts", 3, "QP transition: RTR → RTS", "Move the QP to Ready to Send; it can now send and receive", 1000)
            .with_action(a, modify(QpState::Rtr, QpState::Rts))
            .with_action(Target::Panel, code("modify_qp_to_rts(...);", "src/rdma_common.c:250"))
            .with_state_change(HostId::A, QpState::Rtr, QpState::Rts),
        Step::new("qp-8-complete", 4, "QP ready", "The Queue Pair is ready for data transfer", 600)
            .with_action(Target::Panel, success("QP is ready for data transfer")),
    ];

    Catalog::new("qp-creation", "QP creation flow", steps)
        .with_description("From protection domain and completion queue to a Queue Pair in RTS")
        .with_phases(&[
            (1, "Resource setup"),
            (2, "QP creation"),
            (3, "State transitions"),
            (4, "Ready"),
        ])
}

fn data_plane() -> Catalog {
    let panel = Target::Panel;
    let steps = vec![
        Step::new("dp-1-prep", 1, "Prepare send WR", "Build the send work request: local buffer and remote address", 800)
            .with_action(Target::HostA, Action::Highlight { element: "sq".to_string() })
            .with_action(panel, code("struct ibv_send_wr sr; sr.wr.rdma.remote_addr = ...;", "src/rdma_common_net.c:170")),
        Step::new("dp-2-post-send", 1, "Post send WR", "Post the work request to the Send Queue", 800)
            .with_action(Target::HostA, Action::Highlight { element: "sq".to_string() })
            .with_action(panel, code("ibv_post_send(qp, &sr, &bad_wr);", "src/rdma_common_net.c:190")),
        Step::new("dp-3-rdma-write", 2, "RDMA WRITE", "The NIC writes straight into remote memory without the remote CPU", 1500)
            .with_action(Target::Network, connect(ConnectionStyle::Solid, "#10B981"))
            .with_action(Target::Network, exchange(HostId::A, "RDMA WRITE", "DATA"))
            .with_action(panel, info("Zero-copy: the remote CPU is not involved")),
        Step::new("dp-4-completion", 2, "Local completion", "The local NIC generates a work completion", 1000)
            .with_action(Target::HostA, Action::Highlight { element: "cq".to_string() })
            .with_action(panel, code("struct ibv_wc wc; ibv_poll_cq(cq, 1, &wc);", "src/rdma_common_net.c:240")),
        Step::new("dp-5-remote-ready", 3, "Remote data available", "The data is in remote memory and the remote application can read it", 800)
            .with_action(Target::HostB, Action::Highlight { element: "mr".to_string() })
            .with_action(panel, info("Remote buffer now holds the written data")),
        Step::new("dp-6-recv-prep", 3, "Prepare receive WR", "Build the receive work request and its buffer", 800)
            .with_action(Target::HostB, Action::Highlight { element: "rq".to_string() })
            .with_action(panel, code("struct ibv_recv_wr rr; rr.sg_list = ...;", "src/rdma_common_net.c:124")),
        Step::new("dp-7-post-recv", 3, "Post receive WR", "Post the work request to the Receive Queue", 800)
            .with_action(Target::HostB, Action::Highlight { element: "rq".to_string() })
            .with_action(panel, code("ibv_post_recv(qp, &rr, &bad_wr);", "src/rdma_common_net.c:152")),
        Step::new("dp-8-complete", 4, "Transfer complete", "The one-sided RDMA WRITE cycle is finished", 600)
            .with_action(panel, success("Data transfer complete")),
    ];

    Catalog::new("data-plane", "Data plane flow", steps)
        .with_description("One-sided RDMA WRITE from posting the WR to remote availability")
        .with_phases(&[(1, "Post"), (2, "Transfer"), (3, "Receive side"), (4, "Done")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_validate() {
        for id in builtin_ids() {
            let catalog = builtin(id).unwrap();
            assert_eq!(catalog.id, *id);
            catalog.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_scenario() {
        let err = builtin("loopback").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownScenario { .. }));
        assert!(err.to_string().contains("connection"));
    }

    #[test]
    fn test_connection_script_shape() {
        let catalog = builtin("connection").unwrap();
        assert_eq!(catalog.len(), 18);
        assert_eq!(catalog.phase_count(), 4);
        assert_eq!(catalog.steps[0].id, "step-1");
        assert_eq!(catalog.steps[17].id, "step-18");

        // One QP transition per step, never both hosts at once
        let transitions: Vec<_> = catalog
            .steps
            .iter()
            .filter_map(|s| s.state_change)
            .collect();
        assert_eq!(transitions.len(), 8);
        for host in HostId::ALL {
            let states: Vec<_> = transitions
                .iter()
                .filter(|c| c.host == host)
                .map(|c| c.to)
                .collect();
            assert_eq!(
                states,
                vec![QpState::Reset, QpState::Init, QpState::Rtr, QpState::Rts]
            );
        }
    }

    #[test]
    fn test_builtin_phase_names() {
        let catalog = builtin("connection").unwrap();
        assert_eq!(catalog.phase_name(1), Some("Resource setup"));
        assert_eq!(catalog.phase_name(4), Some("Connected"));
    }
}
