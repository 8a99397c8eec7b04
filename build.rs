fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/etcd_rpc.proto");

    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/etcd_rpc.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("protobuf compile error: {}", e));

    Ok(())
}
