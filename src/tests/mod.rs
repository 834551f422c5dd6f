mod test_control_loop;
mod test_utils;
