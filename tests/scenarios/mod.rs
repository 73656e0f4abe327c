mod default_instance_test;
mod order_flow_test;
