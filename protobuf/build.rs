fn main() {
    println!("cargo:rerun-if-changed=./sandboxjobs.proto");
    tonic_build::compile_protos("./sandboxjobs.proto")
        .unwrap_or_else(|err| panic!("Failed to compile protos {:?}", err));
}
