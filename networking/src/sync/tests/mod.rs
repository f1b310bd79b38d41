mod common;

mod batch_tests;
mod peer_balancer_tests;
