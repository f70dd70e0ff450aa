fn main() -> std::io::Result<()> {
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/fim/fimd.proto"], &["proto"])?;

    // The Tasks server is only served by tests standing in for containerd.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/containerd/types/task.proto",
                "proto/containerd/services/tasks/v1/tasks.proto",
            ],
            &["proto"],
        )?;

    Ok(())
}
