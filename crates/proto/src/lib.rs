#![allow(clippy::all)]

pub mod bazel_re {
    tonic::include_proto!("build.bazel.remote.execution.v2");
}

pub mod bytestream {
    tonic::include_proto!("google.bytestream");
}
