tonic::include_proto!("sandboxjobs");
