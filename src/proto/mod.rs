//! Generated etcd v3 client stubs.

#![allow(clippy::all)]

tonic::include_proto!("etcdserverpb");
