fn main() -> std::io::Result<()> {
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(
            &[
                "proto/containerd/api/services/containers/v1/containers.proto",
                "proto/containerd/api/services/events/v1/events.proto",
                "proto/containerd/api/events/task.proto",
            ],
            &["proto/containerd"],
        )?;

    Ok(())
}
