fn main() -> std::io::Result<()> {
    prost_build::compile_protos(
        &[
            "proto/securemessage.proto",
            "proto/ukey2.proto",
            "proto/device_to_device_message.proto",
            "proto/offline_wire_formats.proto",
            "proto/nearby_sharing.proto",
        ],
        &["proto/"],
    )
}
